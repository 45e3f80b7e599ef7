//! Contact laws, law tables and surface intersection oracles.
//!
//! Three pieces, consumed by the collision resolver:
//!
//! - [`ContactLaw`] - behavior of one population pair (adhesion, friction,
//!   deformation regime)
//! - [`ContactLawTable`] - immutable pair-to-law map, complete by
//!   construction
//! - [`ContactOracle`] - finds the intersecting face pairs of two surfaces;
//!   [`EdgePierceOracle`] is the exact default
//!
//! # Example
//!
//! ```
//! use dem_body::TriSurface;
//! use dem_contact::{ContactOracle, EdgePierceOracle};
//! use nalgebra::Vector3;
//!
//! let a = TriSurface::icosphere(1);
//! let mut b = TriSurface::icosphere(1);
//! b.translate(&Vector3::new(1.5, 0.0, 0.0));
//!
//! let oracle = EdgePierceOracle::default();
//! assert!(!oracle.intersecting_pairs(&a, &b).is_empty());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::suboptimal_flops
)]

mod law;
mod oracle;
mod table;

pub use law::{ContactLaw, ContactModel};
pub use oracle::{ContactOracle, EdgePierceOracle};
pub use table::{ContactLawTable, ContactLawTableBuilder};
