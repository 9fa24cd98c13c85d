//! Symbol classification.
//!
//! Every name found in an expression is sorted into one of a fixed set of
//! kinds before any slot is allocated. Classification is pure: the same
//! name with the same configuration always yields the same kind.

use indexmap::IndexMap;

/// Reserved name for simulation time. It cannot be used for anything else.
pub const TIME_NAME: &str = "t";

/// The kind of a symbol appearing in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// `x{n}`: an input slot at a fixed index, written by pushed messages.
    IndexedInput(usize),
    /// A bare name, assigned the next free input slot.
    NamedInput,
    /// `y{n}`: a cell filled from the pull response each tick.
    PulledInput(usize),
    /// The reserved time symbol.
    Time,
    /// A named constant, folded into the compiled expression.
    Constant,
    /// Not classifiable under the current configuration.
    Unsupported,
}

/// Parse the `<prefix><nonneg-integer>` naming pattern, e.g. `x12` or `y0`.
fn indexed_suffix(name: &str, prefix: char) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Classify a candidate name.
///
/// `x{n}` and `y{n}` patterns win over everything, then the reserved time
/// name, then the `c{n}` pattern and the constant table. Anything left is a
/// named input when unknown variables are allowed, and unsupported
/// otherwise.
pub fn classify(name: &str, allow_unknown: bool, constants: &IndexMap<String, f64>) -> VarKind {
    if let Some(index) = indexed_suffix(name, 'x') {
        return VarKind::IndexedInput(index);
    }
    if let Some(index) = indexed_suffix(name, 'y') {
        return VarKind::PulledInput(index);
    }
    if name == TIME_NAME {
        return VarKind::Time;
    }
    if indexed_suffix(name, 'c').is_some() || constants.contains_key(name) {
        return VarKind::Constant;
    }
    if allow_unknown {
        VarKind::NamedInput
    } else {
        VarKind::Unsupported
    }
}
