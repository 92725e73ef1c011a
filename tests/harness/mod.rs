// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the waitlist pipeline.
//!
//! Provides scripted stand-ins for the form's collaborators and throwaway
//! HTTP upstreams for exercising the real clients.

#![allow(dead_code)]

pub mod fakes;
pub mod stub;
