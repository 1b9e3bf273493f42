// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for admission gate attack simulation.
//!
//! Drives the controller with hostile traffic patterns and tallies the
//! decisions it makes.

pub mod attacks;
pub mod generators;
pub mod metrics;
