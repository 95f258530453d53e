//! Recursive outcome tree for one bulletin's dispatch.
//!
//! Sub-operations append failure leaves as they go; success is derived, never
//! stored: a node succeeded iff no node in its subtree is failed. This keeps
//! partial failures visible without aborting sibling operations.

/// One node of the outcome tree.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub failed: bool,
    pub message: Option<String>,
    pub children: Vec<DispatchOutcome>,
}

impl DispatchOutcome {
    /// A non-failed node with no children (the usual root).
    pub fn root() -> Self {
        Self::default()
    }

    /// A failed leaf carrying a diagnostic.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failed: true,
            message: Some(message.into()),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: DispatchOutcome) {
        self.children.push(child);
    }

    /// True iff no node in this subtree (including self) is failed.
    pub fn succeeded(&self) -> bool {
        !self.failed && self.children.iter().all(DispatchOutcome::succeeded)
    }

    /// Diagnostics of all failed nodes, depth-first.
    pub fn failure_messages(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_failures(&mut out);
        out
    }

    fn collect_failures<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.failed {
            if let Some(message) = &self.message {
                out.push(message.as_str());
            }
        }
        for child in &self.children {
            child.collect_failures(out);
        }
    }

    /// All failure diagnostics joined with "; ", for the audit record.
    pub fn joined_errors(&self) -> String {
        self.failure_messages().join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_succeeds() {
        assert!(DispatchOutcome::root().succeeded());
    }

    #[test]
    fn single_failure_leaf_fails_the_root() {
        let mut root = DispatchOutcome::root();
        root.push(DispatchOutcome::failure("не удалось"));
        assert!(!root.succeeded());
        assert_eq!(root.failure_messages(), vec!["не удалось"]);
    }

    #[test]
    fn deeply_nested_failure_is_found() {
        let mut root = DispatchOutcome::root();
        let mut middle = DispatchOutcome::root();
        let mut inner = DispatchOutcome::root();
        inner.push(DispatchOutcome::failure("глубокая ошибка"));
        middle.push(inner);
        root.push(DispatchOutcome::root());
        root.push(middle);

        assert!(!root.succeeded());
        assert_eq!(root.joined_errors(), "глубокая ошибка");
    }

    #[test]
    fn mixed_tree_collects_failures_in_order() {
        let mut root = DispatchOutcome::root();
        root.push(DispatchOutcome::failure("первая"));
        root.push(DispatchOutcome::root());
        root.push(DispatchOutcome::failure("вторая"));

        assert_eq!(root.joined_errors(), "первая; вторая");
    }

    #[test]
    fn all_ok_children_succeed() {
        let mut root = DispatchOutcome::root();
        for _ in 0..3 {
            root.push(DispatchOutcome::root());
        }
        assert!(root.succeeded());
        assert!(root.failure_messages().is_empty());
    }
}
