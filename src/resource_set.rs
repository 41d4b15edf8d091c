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

//! Named resource quantities and the set algebra over them.
//!
//! A [`ResourceSet`] maps resource names to exact quantities. It is the currency of
//! the accounting core: task demands, node capacities, and usage views are all
//! resource sets. An entry is always strictly positive; a quantity that reaches zero
//! is removed, so "absent" and "zero" are deliberately indistinguishable to readers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fixed_point::FixedPoint;

/// Resource name recognized by the CPU projections.
pub const CPU_RESOURCE_LABEL: &str = "CPU";
/// Resource name for GPU slots.
pub const GPU_RESOURCE_LABEL: &str = "GPU";
/// Prefix of memory resources, counted in 50-MiB units.
pub const MEMORY_RESOURCE_LABEL: &str = "memory";
/// Shares the memory rendering despite not carrying the prefix.
pub const OBJECT_STORE_MEMORY_RESOURCE_LABEL: &str = "object_store_memory";

/// Errors raised by the accounting core.
///
/// All of these indicate misuse by the calling scheduler, not recoverable runtime
/// conditions: callers are trusted cooperating components, and a mismatch between
/// what the scheduler thinks it holds and what the books say must surface loudly.
#[derive(Error, Debug, PartialEq)]
pub enum AccountingError {
    #[error("accounting invariant violated: {0}")]
    InvariantViolated(String),
    #[error("attempt to use unknown resource: {0}")]
    UnknownResource(String),
    #[error("capacity of resource {resource} would become negative: {remaining}")]
    NegativeCapacity { resource: String, remaining: f64 },
}

/// Renders a quantity for diagnostics. Memory resources are tracked in 50-MiB units
/// and shown in GiB.
fn format_resource(resource_name: &str, quantity: f64) -> String {
    if resource_name == OBJECT_STORE_MEMORY_RESOURCE_LABEL
        || resource_name.starts_with(MEMORY_RESOURCE_LABEL)
    {
        format!("{:.6} GiB", quantity * 50.0 / 1024.0)
    } else {
        format!("{quantity}")
    }
}

/// A mapping from resource name to a strictly positive exact quantity.
///
/// The empty set is the additive identity. Equality is set equality of
/// (name, quantity) pairs; iteration order never matters.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResourceSet {
    amounts: HashMap<String, FixedPoint>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from exact quantities. Every quantity must be strictly positive.
    pub fn from_map(amounts: HashMap<String, FixedPoint>) -> Result<Self, AccountingError> {
        for (name, quantity) in &amounts {
            if *quantity <= FixedPoint::ZERO {
                return Err(AccountingError::InvariantViolated(format!(
                    "resource {name} constructed with non-positive quantity {quantity}"
                )));
            }
        }
        Ok(ResourceSet { amounts })
    }

    /// Builds a set from real-valued quantities, rounding each to the nearest
    /// representable value.
    pub fn from_f64_map(amounts: HashMap<String, f64>) -> Result<Self, AccountingError> {
        Self::from_map(
            amounts
                .into_iter()
                .map(|(name, quantity)| (name, FixedPoint::from_f64(quantity)))
                .collect(),
        )
    }

    /// Builds a set from parallel label/quantity slices.
    pub fn from_labels(labels: &[&str], quantities: &[f64]) -> Result<Self, AccountingError> {
        if labels.len() != quantities.len() {
            return Err(AccountingError::InvariantViolated(format!(
                "{} resource labels paired with {} quantities",
                labels.len(),
                quantities.len()
            )));
        }
        Self::from_map(
            labels
                .iter()
                .zip(quantities)
                .map(|(name, quantity)| (name.to_string(), FixedPoint::from_f64(*quantity)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    /// The quantity for `resource_name`, or zero if absent.
    pub fn get(&self, resource_name: &str) -> FixedPoint {
        self.amounts
            .get(resource_name)
            .copied()
            .unwrap_or(FixedPoint::ZERO)
    }

    pub fn amounts(&self) -> &HashMap<String, FixedPoint> {
        &self.amounts
    }

    pub fn to_f64_map(&self) -> HashMap<String, f64> {
        self.amounts
            .iter()
            .map(|(name, quantity)| (name.clone(), quantity.to_f64()))
            .collect()
    }

    /// Overwrites the entry if `quantity` is positive; otherwise does nothing.
    /// This never deletes — use [`ResourceSet::delete`] for that.
    pub fn add_or_update(&mut self, resource_name: &str, quantity: FixedPoint) {
        if quantity > FixedPoint::ZERO {
            self.amounts.insert(resource_name.to_string(), quantity);
        }
    }

    /// Removes the entry. Returns true iff it existed.
    pub fn delete(&mut self, resource_name: &str) -> bool {
        self.amounts.remove(resource_name).is_some()
    }

    /// True iff `other` covers every entry of `self`. The empty set is a subset of
    /// everything; names present only in `other` are irrelevant.
    pub fn is_subset(&self, other: &ResourceSet) -> bool {
        self.amounts
            .iter()
            .all(|(name, quantity)| *quantity <= other.get(name))
    }

    pub fn is_superset(&self, other: &ResourceSet) -> bool {
        other.is_subset(self)
    }

    /// Lenient subtraction: entries absent from `self` are treated as zero and
    /// skipped, and an entry driven to zero or below is removed.
    pub fn subtract(&mut self, other: &ResourceSet) {
        for (name, quantity) in &other.amounts {
            if let Some(current) = self.amounts.get_mut(name) {
                *current -= *quantity;
                if *current <= FixedPoint::ZERO {
                    self.amounts.remove(name);
                }
            }
        }
    }

    /// Strict subtraction: every name in `other` must exist here with at least the
    /// subtracted quantity. On error nothing has been modified.
    pub fn subtract_strict(&mut self, other: &ResourceSet) -> Result<(), AccountingError> {
        for (name, quantity) in &other.amounts {
            let Some(current) = self.amounts.get(name) else {
                return Err(AccountingError::UnknownResource(name.clone()));
            };
            if *current < *quantity {
                return Err(AccountingError::NegativeCapacity {
                    resource: name.clone(),
                    remaining: (*current - *quantity).to_f64(),
                });
            }
        }
        for (name, quantity) in &other.amounts {
            if let Some(current) = self.amounts.get_mut(name) {
                *current -= *quantity;
                if *current == FixedPoint::ZERO {
                    self.amounts.remove(name);
                }
            }
        }
        Ok(())
    }

    /// Pointwise addition as an outer join: names new to `self` are admitted.
    pub fn add(&mut self, other: &ResourceSet) {
        for (name, quantity) in &other.amounts {
            let entry = self
                .amounts
                .entry(name.clone())
                .or_insert(FixedPoint::ZERO);
            *entry += *quantity;
        }
    }

    /// Pointwise addition capped at `total`'s quantity per name. A name absent from
    /// `total` is skipped entirely, so a release arriving after the resource was
    /// deleted from the node cannot resurrect it.
    pub fn add_constrained(&mut self, other: &ResourceSet, total: &ResourceSet) {
        for (name, quantity) in &other.amounts {
            match total.amounts.get(name) {
                Some(cap) => {
                    let raised = self.get(name) + *quantity;
                    self.amounts.insert(name.clone(), raised.min(*cap));
                }
                None => {
                    log::debug!(
                        "resource {name} is gone from the total capacity, dropping its release"
                    );
                }
            }
        }
    }

    /// Projection onto the CPU entry.
    pub fn get_num_cpus(&self) -> ResourceSet {
        let mut cpu_set = ResourceSet::new();
        let cpu_quantity = self.get(CPU_RESOURCE_LABEL);
        if cpu_quantity > FixedPoint::ZERO {
            cpu_set
                .amounts
                .insert(CPU_RESOURCE_LABEL.to_string(), cpu_quantity);
        }
        cpu_set
    }
}

impl PartialEq for ResourceSet {
    fn eq(&self, other: &Self) -> bool {
        self.is_subset(other) && other.is_subset(self)
    }
}

impl std::fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.amounts.is_empty() {
            return write!(f, "{{}}");
        }
        // Sorted for stable output.
        let mut names: Vec<&String> = self.amounts.keys().collect();
        names.sort();
        let rendered: Vec<String> = names
            .into_iter()
            .map(|name| {
                format!(
                    "{{{}: {}}}",
                    name,
                    format_resource(name, self.amounts[name].to_f64())
                )
            })
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}
