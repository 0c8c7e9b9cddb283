//! Layered header/param store with per-method and per-call precedence.

// std
use std::collections::HashMap;
// self
use crate::{Error, Result};

/// A validation hook run against the merged view before a mutation commits.
pub type Validator = Box<dyn Fn(&HashMap<String, String>, Option<&str>) -> Result<()> + Send + Sync>;

/// Three-layer map of defaults, per-method overrides, and a validation hook.
///
/// Per-call overrides are not stored here; they are supplied to
/// [`PropertyStore::resolve`] at composition time and win over everything
/// else, matching the precedence in the specification: per-call > per-method
/// > defaults.
pub struct PropertyStore {
	defaults: HashMap<String, String>,
	per_method: HashMap<String, HashMap<String, String>>,
	validator: Option<Validator>,
}
impl PropertyStore {
	/// Construct an empty store with no validation hook.
	pub fn new() -> Self {
		Self { defaults: HashMap::new(), per_method: HashMap::new(), validator: None }
	}

	/// Attach a validation hook, replacing any previously set hook.
	pub fn with_validator(mut self, validator: Validator) -> Self {
		self.validator = Some(validator);
		self
	}

	/// Merge `entries` into the defaults layer, or the layer for `method` if
	/// given. Validation runs against the post-merge view; on failure the
	/// store is left unchanged (the merge is computed on a clone first).
	pub fn set(
		&mut self,
		entries: HashMap<String, String>,
		method: Option<&str>,
	) -> Result<()> {
		let method = method.map(normalize_method);
		let mut target = match &method {
			Some(m) => self.per_method.get(m).cloned().unwrap_or_default(),
			None => self.defaults.clone(),
		};
		target.extend(entries);

		if let Some(validator) = &self.validator {
			validator(&target, method.as_deref())?;
		}

		match method {
			Some(m) => {
				self.per_method.insert(m, target);
			},
			None => self.defaults = target,
		}

		Ok(())
	}

	/// Remove the given keys from the target layer only (defaults, or the
	/// named method's layer). Validation is not run on removal.
	pub fn remove(&mut self, keys: &[String], method: Option<&str>) {
		match method.map(normalize_method) {
			Some(m) => {
				if let Some(layer) = self.per_method.get_mut(&m) {
					for key in keys {
						layer.remove(key);
					}
				}
			},
			None =>
				for key in keys {
					self.defaults.remove(key);
				},
		}
	}

	/// Whether `key` is present in the effective view for `method`.
	pub fn has(&self, key: &str, method: Option<&str>) -> bool {
		self.resolve(method, None).contains_key(key)
	}

	/// A clone of the defaults layer only.
	pub fn defaults(&self) -> HashMap<String, String> {
		self.defaults.clone()
	}

	/// A clone of every layer merged together, ignoring per-call overrides.
	pub fn all(&self, method: Option<&str>) -> HashMap<String, String> {
		self.resolve(method, None)
	}

	/// Build a fresh merged map: defaults ⊕ per-method[method] ⊕ per_call.
	///
	/// Never invokes the validation hook — validation only runs on mutation.
	pub fn resolve(
		&self,
		method: Option<&str>,
		per_call: Option<&HashMap<String, String>>,
	) -> HashMap<String, String> {
		let mut merged = self.defaults.clone();

		if let Some(method) = method {
			let normalized = normalize_method(method);
			if let Some(layer) = self.per_method.get(&normalized) {
				merged.extend(layer.clone());
			}
		}

		if let Some(per_call) = per_call {
			merged.extend(per_call.clone());
		}

		merged
	}
}
impl Default for PropertyStore {
	fn default() -> Self {
		Self::new()
	}
}

fn normalize_method(method: &str) -> String {
	method.to_ascii_uppercase()
}

/// Reject prototype-pollution-style keys when ingesting caller-supplied maps.
///
/// Rust has no prototype chain, but a `HashMap<String, String>` merged into
/// serialized config (e.g. deserialized from JSON) can still carry these
/// sentinel keys from an upstream JS caller; reject them defensively.
pub fn reject_dangerous_keys(entries: &HashMap<String, String>) -> Result<()> {
	const DANGEROUS: [&str; 3] = ["__proto__", "constructor", "prototype"];
	for key in entries.keys() {
		if DANGEROUS.contains(&key.as_str()) {
			return Err(Error::Validation {
				field: "headers",
				reason: format!("Key '{key}' is not permitted."),
			});
		}
	}
	Ok(())
}
