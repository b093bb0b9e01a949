// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod expander;
pub mod metrics;
pub mod orders;
pub mod pipeline;
pub mod scheduler;
