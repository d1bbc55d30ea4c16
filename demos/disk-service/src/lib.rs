//! Disk management service over DCOM
//!
//! A small object interface in the style of the VDS uninstall-disk service,
//! with stubs written by hand against the `midl-ndr` vocabulary. It covers
//! the shapes a generated stub layer needs: conformant arrays sized by a
//! sibling counter, `[string]` pointers, full pointers shared between array
//! elements and a discriminated union.
//!
//! | Opnum | Operation           | In                 | Out                 |
//! |-------|---------------------|--------------------|---------------------|
//! | 3     | `QueryDisks`        | `u32` max          | [`DiskList`]        |
//! | 4     | `UninstallDisks`    | [`UninstallDisksIn`] | [`UninstallDisksOut`] |
//! | 5     | `GetDiskIdFromName` | name               | [`ObjectId`]        |

mod client;
mod server;
mod types;

pub use client::{loopback, DiskClient};
pub use server::{disk_interface, syntax, DiskStore};
pub use types::*;
