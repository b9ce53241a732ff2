//! Types for the PostgREST client

/// Count options for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOption {
    /// Exact count
    Exact,
}

impl CountOption {
    /// Convert the option to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CountOption::Exact => "exact",
        }
    }
}

/// Options for returning data from a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOption {
    /// Return representation (the affected rows)
    Representation,

    /// Return nothing
    Minimal,
}

impl ReturnOption {
    /// Convert the option to its `Prefer` value
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnOption::Representation => "return=representation",
            ReturnOption::Minimal => "return=minimal",
        }
    }
}

/// Rows of one page together with the total matching the filters
#[derive(Debug, Clone, PartialEq)]
pub struct Counted<T> {
    pub rows: Vec<T>,
    pub total: u64,
}
