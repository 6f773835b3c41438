//! The parameter library: typed entries, per-address tables and parameter
//! sets.
//!
//! Every port owns one [`ParamTable`] per address. A table is a plain data
//! structure; the port's lock serializes all access to it.

mod entry;
mod set;
mod table;
mod types;

pub use entry::{ParamEntry, ParamSnapshot};
pub use set::{ParamDef, ParamSet};
pub use table::ParamTable;
pub use types::{
    DigitalReason, EnumChoice, EnumChoices, GenericPointer, MAX_ENUM_STATES, ParamKind,
    ParamType, ParamValue,
};
