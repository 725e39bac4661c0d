//! # meld-core
//!
//! Foundation types and utilities shared by every meld crate.
//!
//! - **Names**: [`TypeName`], a normalized fully-qualified type name newtype
//! - **Modifiers**: [`Modifiers`] flag set for types, fields, and members
//! - **Descriptors**: [`TypeDescriptor`], [`FieldDescriptor`], [`MemberDescriptor`]
//!   describing what the class loader observed, including pre-resolved ancestry
//! - **Logging**: `tracing` subscriber setup and test log capture

#![deny(unsafe_code)]

pub mod descriptors;
pub mod logging;
pub mod modifiers;
pub mod names;

pub use descriptors::{FieldDescriptor, MemberDescriptor, TypeDescriptor};
pub use modifiers::Modifiers;
pub use names::{TypeName, outer_type_name};
