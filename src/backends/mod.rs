// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera control
//!
//! # Modules
//!
//! - [`camera`]: Tethered and network camera backends
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  CLI / App                   │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  Tethered (SDK)  │  │ Remote (HTTP)   │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
