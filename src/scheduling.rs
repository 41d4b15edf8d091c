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

//! The per-node accounting façade.
//!
//! [`SchedulingResources`] holds the node's coupled quantity views: advertised
//! capacity (`total`), what tasks have not consumed (`available`), demand not yet
//! satisfied (`load`), and the slice of usage attributable to best-effort tasks
//! (`normal_tasks`). The scheduler decides *which* task gets resources; this type
//! only keeps the books consistent while capacity and usage change under it.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::fixed_point::FixedPoint;
use crate::resource_set::{AccountingError, ResourceSet};

/// Creates an ASCII bar chart showing resource utilization.
fn create_bar_chart(used: f64, total: f64, width: usize) -> String {
    if total <= 0.0 {
        return format!("[{}] {used:.2}/{total:.2}", "-".repeat(width));
    }
    let filled = ((used / total).clamp(0.0, 1.0) * width as f64) as usize;
    format!(
        "[{}{}] {used:.2}/{total:.2}",
        "#".repeat(filled),
        "-".repeat(width - filled)
    )
}

/// The coupled resource views of one node.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingResources {
    total: ResourceSet,
    available: ResourceSet,
    load: ResourceSet,
    normal_tasks: ResourceSet,
}

impl SchedulingResources {
    /// A node advertising `total`, with everything initially available.
    pub fn new(total: ResourceSet) -> Self {
        SchedulingResources {
            available: total.clone(),
            total,
            load: ResourceSet::new(),
            normal_tasks: ResourceSet::new(),
        }
    }

    pub fn available_resources(&self) -> &ResourceSet {
        &self.available
    }

    pub fn set_available_resources(&mut self, available: ResourceSet) {
        self.available = available;
    }

    pub fn total_resources(&self) -> &ResourceSet {
        &self.total
    }

    pub fn set_total_resources(&mut self, total: ResourceSet) {
        self.total = total;
    }

    pub fn load_resources(&self) -> &ResourceSet {
        &self.load
    }

    pub fn set_load_resources(&mut self, load: ResourceSet) {
        self.load = load;
    }

    pub fn normal_task_resources(&self) -> &ResourceSet {
        &self.normal_tasks
    }

    pub fn set_normal_task_resources(&mut self, normal_tasks: ResourceSet) {
        self.normal_tasks = normal_tasks;
    }

    /// Takes `demand` out of the available pool. Strict: acquiring a resource the
    /// node never advertised, or more than is available, is a scheduler bug and
    /// must be loud.
    pub fn acquire(&mut self, demand: &ResourceSet) -> Result<(), AccountingError> {
        self.available.subtract_strict(demand)
    }

    /// Returns `resources` to the available pool, capped at the advertised total.
    /// A resource deleted from the total since the acquire is dropped.
    pub fn release(&mut self, resources: &ResourceSet) {
        self.available.add_constrained(resources, &self.total);
    }

    /// Grows both total and available, admitting brand-new names. Used for
    /// synthetic resources that appear mid-run.
    pub fn add_resource(&mut self, resources: &ResourceSet) {
        self.total.add(resources);
        self.available.add(resources);
    }

    /// Moves the advertised capacity of `resource_name` to `capacity`, shifting
    /// `available` by the same delta and clipping it at zero. A capacity of zero
    /// leaves the resource absent from both views. `load` is untouched.
    pub fn update_resource_capacity(&mut self, resource_name: &str, capacity: i64) {
        let new_capacity = FixedPoint::from(capacity);
        let current_capacity = self.total.get(resource_name);
        let new_available = if current_capacity > FixedPoint::ZERO {
            let delta = new_capacity - current_capacity;
            (self.available.get(resource_name) + delta).max(FixedPoint::ZERO)
        } else {
            new_capacity
        };

        if new_capacity > FixedPoint::ZERO {
            self.total.add_or_update(resource_name, new_capacity);
        } else {
            self.total.delete(resource_name);
        }
        if new_available > FixedPoint::ZERO {
            self.available.add_or_update(resource_name, new_available);
        } else {
            self.available.delete(resource_name);
        }
    }

    /// Removes the resource from total, available, and load.
    pub fn delete_resource(&mut self, resource_name: &str) {
        self.total.delete(resource_name);
        self.available.delete(resource_name);
        self.load.delete(resource_name);
    }

    /// Diagnostic rendering of the three interesting views. The available line
    /// excludes normal-task usage so reserved and best-effort consumption can be
    /// told apart at a glance.
    pub fn debug_string(&self) -> String {
        let mut available = self.available.clone();
        available.subtract(&self.normal_tasks);
        format!(
            "\n- total: {}\n- avail: {}\n- normal task usage: {}",
            self.total, available, self.normal_tasks
        )
    }

    /// Renders a per-resource utilization table.
    pub fn utilization_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Resource"),
                Cell::new("Used"),
                Cell::new("Free"),
                Cell::new("Total"),
                Cell::new("Utilization"),
            ]);

        // Sorted by resource name for stable output.
        let mut names: Vec<&String> = self.total.amounts().keys().collect();
        names.sort();

        for name in names {
            let total = self.total.get(name).to_f64();
            let free = self.available.get(name).to_f64();
            let used = (total - free).max(0.0);
            table.add_row(vec![
                Cell::new(name),
                Cell::new(format!("{used:.2}")),
                Cell::new(format!("{free:.2}")),
                Cell::new(format!("{total:.2}")),
                Cell::new(create_bar_chart(used, total, 20)),
            ]);
        }

        table.to_string()
    }
}
