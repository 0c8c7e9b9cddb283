//! Ordered, AND-combined rule matching with a per-(path, method) memo cache.

// std
use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};
// crates.io
use regex::Regex;
// self
use crate::{Error, Result};

/// The request-shaped input a [`PolicyRule`] is matched against.
///
/// `RequestPipeline` builds this from its richer request context; kept
/// narrow here so the resolver has no dependency on the pipeline's types.
#[derive(Debug, Clone)]
pub struct RuleContext {
	/// HTTP method, already normalized to upper case.
	pub method: String,
	/// Request path (not the full URL).
	pub path: String,
	/// Composed request headers, for rules whose `skip` hook inspects them.
	pub headers: HashMap<String, String>,
}

/// AND-combined match criteria; every present field must hold.
#[derive(Default)]
pub struct MatchCriteria {
	/// Exact string equality against the path.
	pub is: Option<String>,
	/// Path prefix check.
	pub starts_with: Option<String>,
	/// Path suffix check.
	pub ends_with: Option<String>,
	/// Substring check.
	pub includes: Option<String>,
	/// Regex test against the path.
	pub matches: Option<Regex>,
}
impl MatchCriteria {
	fn is_empty(&self) -> bool {
		self.is.is_none()
			&& self.starts_with.is_none()
			&& self.ends_with.is_none()
			&& self.includes.is_none()
			&& self.matches.is_none()
	}

	fn holds_for(&self, path: &str) -> bool {
		self.is.as_deref().is_none_or(|v| v == path)
			&& self.starts_with.as_deref().is_none_or(|v| path.starts_with(v))
			&& self.ends_with.as_deref().is_none_or(|v| path.ends_with(v))
			&& self.includes.as_deref().is_none_or(|v| path.contains(v))
			&& self.matches.as_ref().is_none_or(|re| re.is_match(path))
	}
}

/// A single policy rule: match criteria plus the policy it carries.
///
/// Generic over `P`, the policy payload (e.g. cache TTL/staleIn, or a
/// dedup configuration) so the same resolver shape serves both the cache
/// and dedup rule lists.
pub struct PolicyRule<P> {
	/// Match criteria; construction rejects a rule with none set.
	pub match_: MatchCriteria,
	/// Whether this rule is active; `false` bypasses the subsystem entirely.
	pub enabled: Option<bool>,
	/// Method whitelist; `None` means "all methods".
	pub methods: Option<Vec<String>>,
	/// Skip predicate; `Some(true)` bypasses even when match criteria hold.
	pub skip: Option<Arc<dyn Fn(&RuleContext) -> bool + Send + Sync>>,
	/// Subsystem-specific policy data (TTL/staleIn, dedup key fn, etc).
	pub policy: P,
}
impl<P> PolicyRule<P> {
	fn matches(&self, ctx: &RuleContext) -> bool {
		if !self.match_.holds_for(&ctx.path) {
			return false;
		}
		if let Some(methods) = &self.methods {
			if !methods.iter().any(|m| m.eq_ignore_ascii_case(&ctx.method)) {
				return false;
			}
		}
		true
	}
}

/// Resolves a [`RuleContext`] against an ordered rule list, memoized by
/// `(path, method)`. First match wins; construction rejects any rule with
/// no match criteria at all.
pub struct RuleResolver<P> {
	rules: RwLock<Vec<PolicyRule<P>>>,
	cache: RwLock<HashMap<(String, String), Option<usize>>>,
}
impl<P> RuleResolver<P> {
	/// Build a resolver over `rules`, rejecting any rule with empty criteria.
	pub fn new(rules: Vec<PolicyRule<P>>) -> Result<Self> {
		validate_rules(&rules)?;
		Ok(Self { rules: RwLock::new(rules), cache: RwLock::new(HashMap::new()) })
	}

	/// Replace the rule list wholesale, invalidating the memo cache.
	pub fn replace_rules(&self, rules: Vec<PolicyRule<P>>) -> Result<()> {
		validate_rules(&rules)?;
		*self.rules.write().expect("rule list lock poisoned") = rules;
		self.cache.write().expect("rule cache lock poisoned").clear();
		Ok(())
	}

	/// Drop every memoized `(path, method)` resolution.
	///
	/// Called whenever some policy affecting the resolved view changes
	/// without replacing the rule list itself (e.g. a rule's referenced
	/// external state).
	pub fn invalidate(&self) {
		self.cache.write().expect("rule cache lock poisoned").clear();
	}

	/// Resolve `ctx` to the index of the first matching rule, or `None`.
	///
	/// Memoized by `(path, method)`; the `skip` hook is re-evaluated on
	/// every call since it may depend on headers not part of the cache key.
	pub fn resolve_index(&self, ctx: &RuleContext) -> Option<usize> {
		let cache_key = (ctx.path.clone(), ctx.method.clone());
		if let Some(hit) = self.cache.read().expect("rule cache lock poisoned").get(&cache_key) {
			return *hit;
		}

		let rules = self.rules.read().expect("rule list lock poisoned");
		let found = rules.iter().position(|rule| rule.matches(ctx));
		drop(rules);

		self.cache.write().expect("rule cache lock poisoned").insert(cache_key, found);
		found
	}

	/// Resolve `ctx`, additionally evaluating the matched rule's `skip`
	/// hook (if any) against `ctx`. Returns `None` if no rule matched or
	/// the matched rule's `skip` hook returned `true`.
	pub fn resolve(&self, ctx: &RuleContext) -> Option<usize> {
		let idx = self.resolve_index(ctx)?;
		let rules = self.rules.read().expect("rule list lock poisoned");
		let rule = rules.get(idx)?;
		if rule.skip.as_ref().is_some_and(|skip| skip(ctx)) {
			return None;
		}
		Some(idx)
	}

	/// Run `f` against the policy payload of the rule at `idx`, if present.
	pub fn with_policy<R>(&self, idx: usize, f: impl FnOnce(&P) -> R) -> Option<R> {
		let rules = self.rules.read().expect("rule list lock poisoned");
		rules.get(idx).map(|rule| f(&rule.policy))
	}

	/// Whether the rule at `idx` is enabled (absent means enabled).
	pub fn is_enabled(&self, idx: usize) -> bool {
		let rules = self.rules.read().expect("rule list lock poisoned");
		rules.get(idx).and_then(|r| r.enabled).unwrap_or(true)
	}
}

fn validate_rules<P>(rules: &[PolicyRule<P>]) -> Result<()> {
	for (idx, rule) in rules.iter().enumerate() {
		if rule.match_.is_empty() {
			return Err(Error::Config {
				field: "rules",
				reason: format!("rule at index {idx} has no match criteria"),
			});
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx(path: &str, method: &str) -> RuleContext {
		RuleContext { method: method.to_string(), path: path.to_string(), headers: HashMap::new() }
	}

	fn rule(prefix: &str, policy: u32) -> PolicyRule<u32> {
		PolicyRule {
			match_: MatchCriteria { starts_with: Some(prefix.to_string()), ..Default::default() },
			enabled: None,
			methods: None,
			skip: None,
			policy,
		}
	}

	#[test]
	fn construction_rejects_rule_with_no_criteria() {
		let bare = PolicyRule { match_: MatchCriteria::default(), enabled: None, methods: None, skip: None, policy: 1u32 };
		assert!(RuleResolver::new(vec![bare]).is_err());
	}

	#[test]
	fn first_matching_rule_wins() {
		let resolver = RuleResolver::new(vec![rule("/users", 1), rule("/", 2)]).unwrap();
		let idx = resolver.resolve(&ctx("/users/42", "GET")).unwrap();
		assert_eq!(resolver.with_policy(idx, |p| *p), Some(1));
	}

	#[test]
	fn method_whitelist_excludes_non_matching_methods() {
		let mut only_post = rule("/users", 1);
		only_post.methods = Some(vec!["POST".to_string()]);
		let resolver = RuleResolver::new(vec![only_post]).unwrap();
		assert!(resolver.resolve(&ctx("/users", "GET")).is_none());
		assert!(resolver.resolve(&ctx("/users", "POST")).is_some());
	}

	#[test]
	fn skip_hook_suppresses_an_otherwise_matching_rule() {
		let mut skip_all = rule("/users", 1);
		skip_all.skip = Some(Arc::new(|_: &RuleContext| true));
		let resolver = RuleResolver::new(vec![skip_all]).unwrap();
		assert!(resolver.resolve(&ctx("/users", "GET")).is_none());
		// resolve_index still reports the underlying match; only resolve() applies skip.
		assert!(resolver.resolve_index(&ctx("/users", "GET")).is_some());
	}

	#[test]
	fn replace_rules_invalidates_stale_cache_entries() {
		let resolver = RuleResolver::new(vec![rule("/a", 1)]).unwrap();
		assert!(resolver.resolve(&ctx("/a", "GET")).is_some());
		resolver.replace_rules(vec![rule("/b", 2)]).unwrap();
		assert!(resolver.resolve(&ctx("/a", "GET")).is_none());
	}
}
