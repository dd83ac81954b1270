/// A directed edge from prerequisite to dependent.
#[derive(Debug, Clone, Default)]
pub struct Edge {
    /// True iff a successful CheckApply on the source should be observable
    /// by the sink as a refresh signal.
    pub notify: bool,
    pub label: String,
}

impl Edge {
    pub fn new(label: impl Into<String>, notify: bool) -> Self {
        Self {
            notify,
            label: label.into(),
        }
    }
}
