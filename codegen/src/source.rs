//! Rust source emission for compiled tables.
//!
//! [`generate_source`] renders a table as a standalone module that
//! rebuilds it by value: one constructor per slot, a `table()`
//! assembler, and a `slot_index` match over every addressable name.
//! The intended flow is a build script writing the module into
//! `OUT_DIR` and the application `include!`ing it, then hydrating with
//! its factory set at startup.
//!
//! Output is deterministic for a given table and fingerprint; the
//! bytes only change when the graph does, so the file diffs cleanly
//! under version control. All paths are fully qualified, which keeps
//! the module free of imports and usable in any position.

use std::collections::BTreeMap;
use std::fmt::Write;

use weave::Value;

use crate::fingerprint::Fingerprint;
use crate::table::{CompiledArg, CompiledTable};

/// Renders `table` as a compilable Rust module.
pub fn generate_source(table: &CompiledTable, fingerprint: &Fingerprint) -> String {
  let mut out = String::new();
  out.push_str("//! Generated service table. Do not edit.\n");
  out.push_str("//!\n");
  let _ = writeln!(
    out,
    "//! {} services, fingerprint {}.",
    table.slots.len(),
    fingerprint.short()
  );
  out.push('\n');
  let _ = writeln!(out, "pub const FINGERPRINT: &str = {:?};", fingerprint.as_str());
  let _ = writeln!(out, "pub const SERVICE_COUNT: usize = {};", table.slots.len());

  for (index, slot) in table.slots.iter().enumerate() {
    out.push('\n');
    let _ = writeln!(out, "/// `{}` backed by `{}`.", slot.id, slot.type_name);
    let _ = writeln!(out, "fn slot_{}() -> ::weave_codegen::CompiledSlot {{", index);
    out.push_str("  ::weave_codegen::CompiledSlot {\n");
    let _ = writeln!(out, "    id: {:?}.to_owned(),", slot.id);
    let _ = writeln!(out, "    type_name: {:?}.to_owned(),", slot.type_name);
    let _ = writeln!(out, "    singleton: {},", slot.singleton);
    let _ = writeln!(out, "    public: {},", slot.public);
    let _ = writeln!(out, "    lazy: {},", slot.lazy);
    match &slot.value {
      Some(value) => {
        out.push_str("    value: Some(");
        value_literal(&mut out, value);
        out.push_str("),\n");
      }
      None => out.push_str("    value: None,\n"),
    }
    if slot.args.is_empty() {
      out.push_str("    args: vec![],\n");
    } else {
      out.push_str("    args: vec![\n");
      for arg in &slot.args {
        out.push_str("      ");
        arg_literal(&mut out, arg);
        out.push_str(",\n");
      }
      out.push_str("    ],\n");
    }
    if slot.calls.is_empty() {
      out.push_str("    calls: vec![],\n");
    } else {
      out.push_str("    calls: vec![\n");
      for call in &slot.calls {
        out.push_str("      ::weave_codegen::CompiledCall {\n");
        let _ = writeln!(out, "        name: {:?}.to_owned(),", call.name);
        if call.args.is_empty() {
          out.push_str("        args: vec![],\n");
        } else {
          out.push_str("        args: vec![\n");
          for arg in &call.args {
            out.push_str("          ");
            arg_literal(&mut out, arg);
            out.push_str(",\n");
          }
          out.push_str("        ],\n");
        }
        out.push_str("      },\n");
      }
      out.push_str("    ],\n");
    }
    out.push_str("  }\n");
    out.push_str("}\n");
  }

  out.push('\n');
  out.push_str("/// The full table, rebuilt by value.\n");
  out.push_str("pub fn table() -> ::weave_codegen::CompiledTable {\n");
  out.push_str("  ::weave_codegen::CompiledTable {\n");
  let _ = writeln!(out, "    schema_version: {},", table.schema_version);
  if table.slots.is_empty() {
    out.push_str("    slots: vec![],\n");
  } else {
    out.push_str("    slots: vec![");
    for index in 0..table.slots.len() {
      if index > 0 {
        out.push_str(", ");
      }
      let _ = write!(out, "slot_{}()", index);
    }
    out.push_str("],\n");
  }
  if table.lookup.is_empty() {
    out.push_str("    lookup: vec![],\n");
  } else {
    out.push_str("    lookup: vec![\n");
    for entry in &table.lookup {
      let _ = writeln!(
        out,
        "      ::weave_codegen::LookupEntry {{ name: {:?}.to_owned(), slot: {}, public: {}, alias: {} }},",
        entry.name, entry.slot, entry.public, entry.alias
      );
    }
    out.push_str("    ],\n");
  }
  if table.tags.is_empty() {
    out.push_str("    tags: vec![],\n");
  } else {
    out.push_str("    tags: vec![\n");
    for tag in &table.tags {
      out.push_str("      ::weave_codegen::CompiledTag {\n");
      let _ = writeln!(out, "        name: {:?}.to_owned(),", tag.name);
      if tag.entries.is_empty() {
        out.push_str("        entries: vec![],\n");
      } else {
        out.push_str("        entries: vec![\n");
        for entry in &tag.entries {
          let _ = write!(
            out,
            "          ::weave_codegen::TaggedSlot {{ slot: {}, attributes: ",
            entry.slot
          );
          attributes_literal(&mut out, &entry.attributes);
          out.push_str(" },\n");
        }
        out.push_str("        ],\n");
      }
      out.push_str("      },\n");
    }
    out.push_str("    ],\n");
  }
  out.push_str("  }\n");
  out.push_str("}\n");

  out.push('\n');
  out.push_str("/// Maps a name to its slot and whether outside callers may fetch it.\n");
  out.push_str("pub fn slot_index(id: &str) -> Option<(usize, bool)> {\n");
  out.push_str("  match id {\n");
  for entry in &table.lookup {
    let _ = writeln!(
      out,
      "    {:?} => Some(({}, {})),",
      entry.name,
      entry.slot,
      entry.alias || entry.public
    );
  }
  out.push_str("    _ => None,\n");
  out.push_str("  }\n");
  out.push_str("}\n");

  out
}

fn value_literal(out: &mut String, value: &Value) {
  match value {
    Value::Str(s) => {
      let _ = write!(out, "::weave::Value::Str({:?}.to_owned())", s);
    }
    Value::Int(n) => {
      let _ = write!(out, "::weave::Value::Int({})", n);
    }
    Value::Float(n) if n.is_nan() => out.push_str("::weave::Value::Float(f64::NAN)"),
    Value::Float(n) if n.is_infinite() => {
      if *n > 0.0 {
        out.push_str("::weave::Value::Float(f64::INFINITY)");
      } else {
        out.push_str("::weave::Value::Float(f64::NEG_INFINITY)");
      }
    }
    Value::Float(n) => {
      // Debug prints the shortest representation that round-trips.
      let _ = write!(out, "::weave::Value::Float({:?})", n);
    }
    Value::Bool(b) => {
      let _ = write!(out, "::weave::Value::Bool({})", b);
    }
    Value::Seq(items) => {
      out.push_str("::weave::Value::Seq(vec![");
      for (position, item) in items.iter().enumerate() {
        if position > 0 {
          out.push_str(", ");
        }
        value_literal(out, item);
      }
      out.push_str("])");
    }
    Value::Null => out.push_str("::weave::Value::Null"),
  }
}

fn arg_literal(out: &mut String, arg: &CompiledArg) {
  match arg {
    CompiledArg::Value(v) => {
      out.push_str("::weave_codegen::CompiledArg::Value(");
      value_literal(out, v);
      out.push(')');
    }
    CompiledArg::Slot(i) => {
      let _ = write!(out, "::weave_codegen::CompiledArg::Slot({})", i);
    }
    CompiledArg::LazySlot(i) => {
      let _ = write!(out, "::weave_codegen::CompiledArg::LazySlot({})", i);
    }
    CompiledArg::Peek(i) => {
      let _ = write!(out, "::weave_codegen::CompiledArg::Peek({})", i);
    }
    CompiledArg::Absent => out.push_str("::weave_codegen::CompiledArg::Absent"),
    CompiledArg::Seq(items) => {
      out.push_str("::weave_codegen::CompiledArg::Seq(vec![");
      for (position, item) in items.iter().enumerate() {
        if position > 0 {
          out.push_str(", ");
        }
        arg_literal(out, item);
      }
      out.push_str("])");
    }
  }
}

fn attributes_literal(out: &mut String, attributes: &BTreeMap<String, Value>) {
  if attributes.is_empty() {
    out.push_str("::std::collections::BTreeMap::new()");
    return;
  }
  out.push_str("::std::collections::BTreeMap::from([");
  for (position, (key, value)) in attributes.iter().enumerate() {
    if position > 0 {
      out.push_str(", ");
    }
    let _ = write!(out, "({:?}.to_owned(), ", key);
    value_literal(out, value);
    out.push(')');
  }
  out.push_str("])");
}
