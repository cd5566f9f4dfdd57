//! Security Descriptors
//!
//! Every value flowing through the interpreter carries a descriptor of three
//! string sets: semantic labels ("secret", "pii", ...), taint markers for
//! provenance ("src:stdin", "src:keychain", ...), and source strings used in
//! diagnostics. Merging is union on all three fields.

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

/// Labels, taint, and diagnostic sources attached to a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    /// Semantic labels ("secret", "public", user-defined)
    pub labels: BTreeSet<String>,
    /// Origin markers ("src:stdin", "src:net", "src:keychain")
    pub taint: BTreeSet<String>,
    /// Operation/source strings for diagnostics
    pub sources: BTreeSet<String>,
}

impl SecurityDescriptor {
    /// Empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor with a single label.
    pub fn with_label(label: impl Into<String>) -> Self {
        let mut d = Self::new();
        d.labels.insert(label.into());
        d
    }

    /// Descriptor with a single taint marker.
    pub fn with_taint(taint: impl Into<String>) -> Self {
        let mut d = Self::new();
        d.taint.insert(taint.into());
        d
    }

    /// Descriptor with a single source string.
    pub fn with_source(source: impl Into<String>) -> Self {
        let mut d = Self::new();
        d.sources.insert(source.into());
        d
    }

    /// Add a label in place.
    pub fn add_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.labels.insert(label.into());
        self
    }

    /// Add a taint marker in place.
    pub fn add_taint(&mut self, taint: impl Into<String>) -> &mut Self {
        self.taint.insert(taint.into());
        self
    }

    /// Add a source string in place.
    pub fn add_source(&mut self, source: impl Into<String>) -> &mut Self {
        self.sources.insert(source.into());
        self
    }

    /// Union another descriptor into this one.
    pub fn merge(&mut self, other: &SecurityDescriptor) {
        for l in &other.labels {
            self.labels.insert(l.clone());
        }
        for t in &other.taint {
            self.taint.insert(t.clone());
        }
        for s in &other.sources {
            self.sources.insert(s.clone());
        }
    }

    /// Union of two descriptors.
    pub fn merged(a: &SecurityDescriptor, b: &SecurityDescriptor) -> SecurityDescriptor {
        let mut out = a.clone();
        out.merge(b);
        out
    }

    /// Union of any number of descriptors.
    pub fn union_all<'a, I>(descriptors: I) -> SecurityDescriptor
    where
        I: IntoIterator<Item = &'a SecurityDescriptor>,
    {
        let mut out = SecurityDescriptor::new();
        for d in descriptors {
            out.merge(d);
        }
        out
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn has_taint(&self, taint: &str) -> bool {
        self.taint.contains(taint)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.taint.is_empty() && self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(labels: &[&str], taint: &[&str], sources: &[&str]) -> SecurityDescriptor {
        let mut out = SecurityDescriptor::new();
        for l in labels {
            out.add_label(*l);
        }
        for t in taint {
            out.add_taint(*t);
        }
        for s in sources {
            out.add_source(*s);
        }
        out
    }

    #[test]
    fn test_merge_is_union() {
        let a = d(&["secret"], &["src:stdin"], &["op:var"]);
        let b = d(&["pii"], &["src:net"], &[]);

        let merged = SecurityDescriptor::merged(&a, &b);
        assert!(merged.has_label("secret"));
        assert!(merged.has_label("pii"));
        assert!(merged.has_taint("src:stdin"));
        assert!(merged.has_taint("src:net"));
        assert!(merged.sources.contains("op:var"));
    }

    #[test]
    fn test_merge_commutative() {
        let a = d(&["secret"], &["src:stdin"], &["a"]);
        let b = d(&["pii", "public"], &["src:net"], &["b"]);
        assert_eq!(
            SecurityDescriptor::merged(&a, &b),
            SecurityDescriptor::merged(&b, &a)
        );
    }

    #[test]
    fn test_merge_associative() {
        let a = d(&["x"], &[], &[]);
        let b = d(&["y"], &["t"], &[]);
        let c = d(&[], &[], &["s"]);

        let ab_c = SecurityDescriptor::merged(&SecurityDescriptor::merged(&a, &b), &c);
        let a_bc = SecurityDescriptor::merged(&a, &SecurityDescriptor::merged(&b, &c));
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn test_merge_idempotent() {
        let a = d(&["secret"], &["src:keychain"], &["op:exec"]);
        assert_eq!(SecurityDescriptor::merged(&a, &a), a);

        let mut twice = a.clone();
        twice.merge(&a);
        twice.merge(&a);
        assert_eq!(twice, a);
    }

    #[test]
    fn test_union_all() {
        let parts = vec![d(&["a"], &[], &[]), d(&["b"], &[], &[]), d(&[], &["t"], &[])];
        let union = SecurityDescriptor::union_all(parts.iter());
        assert!(union.has_label("a"));
        assert!(union.has_label("b"));
        assert!(union.has_taint("t"));
    }

    #[test]
    fn test_empty() {
        assert!(SecurityDescriptor::new().is_empty());
        assert!(!SecurityDescriptor::with_label("secret").is_empty());
    }
}
