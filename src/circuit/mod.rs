//! Netlist representation and validation.
//!
//! The [`Netlist`] is the read-only topology view the kernel simulates: one
//! [`Element`] per circuit primitive with its terminal nodes, optional branch
//! unknown and positional parameter vector. It is produced once by a
//! [`NetlistBuilder`] from whatever circuit description the caller owns.

mod netlist;
mod types;
mod validate;

pub use netlist::{Element, Netlist, NetlistBuilder};
pub use types::*;
pub use validate::validate_netlist;
