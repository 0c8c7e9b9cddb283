//! Deterministic, order-insensitive fingerprinting used for dedup and cache keys.

// std
use std::fmt::Write as _;
// crates.io
use serde_json::Value;

/// Produce a stable fingerprint for a JSON value graph.
///
/// Primitives are tagged by kind so e.g. `-0.0` and `0.0` or the number `1`
/// and the string `"1"` never collide. Object keys are sorted by their own
/// fingerprint before emission so key order never affects the result; array
/// order is preserved since it is semantically significant.
pub fn fingerprint(value: &Value) -> String {
	let mut out = String::new();
	write_fingerprint(value, &mut out);
	out
}

/// Fingerprint several independent inputs together, in the order given.
///
/// Used to build dedup/cache keys out of `(method, url, body, headers)`
/// tuples without needing to assemble an intermediate JSON object.
pub fn fingerprint_parts<'a, I>(parts: I) -> String
where
	I: IntoIterator<Item = &'a Value>,
{
	let mut out = String::new();
	for (idx, part) in parts.into_iter().enumerate() {
		if idx > 0 {
			out.push('\u{1f}');
		}
		write_fingerprint(part, &mut out);
	}
	out
}

fn write_fingerprint(value: &Value, out: &mut String) {
	match value {
		Value::Null => out.push_str("n:"),
		Value::Bool(b) => {
			out.push_str("b:");
			out.push(if *b { 't' } else { 'f' });
		},
		Value::Number(n) => {
			out.push_str("d:");
			if let Some(f) = n.as_f64() {
				// Distinguish -0 from 0 the way IEEE 754 bit patterns do.
				if f == 0.0 && f.is_sign_negative() {
					out.push_str("-0");
				} else {
					let _ = write!(out, "{f}");
				}
			} else {
				let _ = write!(out, "{n}");
			}
		},
		Value::String(s) => {
			out.push_str("s:");
			let _ = write!(out, "{}:", s.len());
			out.push_str(s);
		},
		Value::Array(items) => {
			out.push_str("a[");
			for item in items {
				write_fingerprint(item, out);
				out.push(',');
			}
			out.push(']');
		},
		Value::Object(map) => {
			// Unordered container: sort entries by key fingerprint so key
			// insertion order never changes the result.
			let mut entries: Vec<(String, String)> = map
				.iter()
				.map(|(k, v)| {
					let mut key_fp = String::new();
					write_fingerprint(&Value::String(k.clone()), &mut key_fp);
					let mut val_fp = String::new();
					write_fingerprint(v, &mut val_fp);
					(key_fp, val_fp)
				})
				.collect();
			entries.sort_by(|a, b| a.0.cmp(&b.0));

			out.push_str("o{");
			for (k, v) in entries {
				out.push_str(&k);
				out.push(':');
				out.push_str(&v);
				out.push(',');
			}
			out.push('}');
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn permuting_object_keys_yields_same_fingerprint() {
		let a = json!({"x": 1, "y": 2});
		let b = json!({"y": 2, "x": 1});
		assert_eq!(fingerprint(&a), fingerprint(&b));
	}

	#[test]
	fn permuting_array_entries_yields_different_fingerprint() {
		let a = json!([1, 2, 3]);
		let b = json!([3, 2, 1]);
		assert_ne!(fingerprint(&a), fingerprint(&b));
	}

	#[test]
	fn string_and_number_do_not_collide() {
		let a = json!("1");
		let b = json!(1);
		assert_ne!(fingerprint(&a), fingerprint(&b));
	}

	#[test]
	fn nested_objects_are_order_insensitive() {
		let a = json!({"outer": {"a": 1, "b": 2}, "z": true});
		let b = json!({"z": true, "outer": {"b": 2, "a": 1}});
		assert_eq!(fingerprint(&a), fingerprint(&b));
	}

	#[test]
	fn fingerprint_parts_is_order_sensitive_across_parts() {
		let parts_a = vec![json!("GET"), json!("/x")];
		let parts_b = vec![json!("/x"), json!("GET")];
		assert_ne!(fingerprint_parts(parts_a.iter()), fingerprint_parts(parts_b.iter()));
	}
}
