// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exact decimal arithmetic for resource quantities.
//!
//! Resource bookkeeping adds and subtracts the same quantities over and over as tasks
//! come and go. With binary floating point those cycles drift, and `available` stops
//! returning to exactly `total` when the node goes idle. [`FixedPoint`] stores
//! quantities as a signed integer count of 1/10000 units, so every add/subtract cycle
//! is exact and equality is meaningful.

use serde::{Deserialize, Serialize};

/// One resource unit is split into this many representable steps.
const RESOURCE_UNIT_SCALING: i64 = 10_000;

/// A signed decimal quantity at a fixed scale of four decimal digits.
///
/// Closed under `+`, `-`, `*`, `/` and totally ordered. Construction from an `f64`
/// rounds to the nearest representable value; integers and the fractions used for
/// sub-slot sharing (1/2, 1/4, ...) are represented exactly.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FixedPoint(i64);

impl FixedPoint {
    pub const ZERO: FixedPoint = FixedPoint(0);
    pub const ONE: FixedPoint = FixedPoint(RESOURCE_UNIT_SCALING);

    /// Rounds to the nearest representable quantity.
    pub fn from_f64(value: f64) -> Self {
        FixedPoint((value * RESOURCE_UNIT_SCALING as f64).round() as i64)
    }

    /// Lossy-by-rounding conversion. Small integers and halves/quarters round-trip
    /// exactly.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / RESOURCE_UNIT_SCALING as f64
    }

    /// True iff the quantity is an exact number of whole units.
    pub fn is_whole(self) -> bool {
        self.0 % RESOURCE_UNIT_SCALING == 0
    }

    /// The whole-unit part, truncated toward zero.
    pub fn trunc(self) -> i64 {
        self.0 / RESOURCE_UNIT_SCALING
    }
}

impl From<i64> for FixedPoint {
    fn from(units: i64) -> Self {
        FixedPoint(units * RESOURCE_UNIT_SCALING)
    }
}

impl From<u64> for FixedPoint {
    fn from(units: u64) -> Self {
        FixedPoint(units as i64 * RESOURCE_UNIT_SCALING)
    }
}

impl std::ops::Add for FixedPoint {
    type Output = FixedPoint;

    fn add(self, rhs: FixedPoint) -> FixedPoint {
        FixedPoint(self.0 + rhs.0)
    }
}

impl std::ops::Sub for FixedPoint {
    type Output = FixedPoint;

    fn sub(self, rhs: FixedPoint) -> FixedPoint {
        FixedPoint(self.0 - rhs.0)
    }
}

impl std::ops::Mul for FixedPoint {
    type Output = FixedPoint;

    fn mul(self, rhs: FixedPoint) -> FixedPoint {
        // Widen through i128 so intermediate products cannot overflow.
        FixedPoint((self.0 as i128 * rhs.0 as i128 / RESOURCE_UNIT_SCALING as i128) as i64)
    }
}

impl std::ops::Div for FixedPoint {
    type Output = FixedPoint;

    fn div(self, rhs: FixedPoint) -> FixedPoint {
        FixedPoint((self.0 as i128 * RESOURCE_UNIT_SCALING as i128 / rhs.0 as i128) as i64)
    }
}

impl std::ops::Neg for FixedPoint {
    type Output = FixedPoint;

    fn neg(self) -> FixedPoint {
        FixedPoint(-self.0)
    }
}

impl std::ops::AddAssign for FixedPoint {
    fn add_assign(&mut self, rhs: FixedPoint) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for FixedPoint {
    fn sub_assign(&mut self, rhs: FixedPoint) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
