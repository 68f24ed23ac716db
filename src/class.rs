//! Class labels assigned to taxa.
//!
//! A candidate species-tree branch splits the taxa into three exclusive
//! classes: the two sides of the branch and everything outside it. A taxon
//! may also be unassigned, which is modelled as `Option<Class>::None` and
//! contributes nothing to any node total.

use std::fmt;
use thiserror::Error;

/// One of the three exclusive classes of a tripartition.
///
/// Class index `i` feeds total slot `i` of every node
/// (see [`Totals`](crate::stats::Totals)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Class {
    First = 0,
    Second = 1,
    Third = 2,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassError {
    #[error("class index {0} is out of range (expected 0, 1 or 2)")]
    OutOfRange(i64),

    #[error("cannot parse class label '{0}'")]
    Unparsable(String),
}

impl Class {
    pub const ALL: [Class; 3] = [Class::First, Class::Second, Class::Third];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: i64) -> Result<Self, ClassError> {
        match idx {
            0 => Ok(Class::First),
            1 => Ok(Class::Second),
            2 => Ok(Class::Third),
            _ => Err(ClassError::OutOfRange(idx)),
        }
    }

    /// The two classes other than `self`, in index order.
    #[inline]
    pub fn others(self) -> (Class, Class) {
        match self {
            Class::First => (Class::Second, Class::Third),
            Class::Second => (Class::First, Class::Third),
            Class::Third => (Class::First, Class::Second),
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Parse a class label as written in assignment files.
///
/// `0`, `1` and `2` select a class; `-`, `-1`, `none` and `unassigned`
/// (case-insensitive) mean unassigned.
pub fn parse_assignment(label: &str) -> Result<Option<Class>, ClassError> {
    let label = label.trim();
    match label.to_ascii_lowercase().as_str() {
        "-" | "-1" | "none" | "unassigned" => return Ok(None),
        _ => {}
    }
    let idx: i64 = label
        .parse()
        .map_err(|_| ClassError::Unparsable(label.to_string()))?;
    Class::from_index(idx).map(Some)
}
