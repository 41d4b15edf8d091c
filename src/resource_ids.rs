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

//! Identity-preserving slot ledgers.
//!
//! Quantities alone are not enough for consumers that pin work to a specific unit:
//! CPU affinity and GPU assignment need to know *which* core or device was handed
//! out. [`ResourceIds`] tracks the individual slots of one resource — whole slots by
//! integer id, partially-consumed slots as (id, residual) pairs — and
//! [`ResourceIdSet`] maps resource names to their ledgers.
//!
//! Capacity can change while slots are out with tasks. A decrease that cannot be
//! covered by currently-available slots is recorded as a decrement backlog: the next
//! returns are absorbed silently instead of becoming available again, so the logical
//! decrease takes effect as outstanding work completes without revoking anything.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fixed_point::FixedPoint;
use crate::resource_set::{AccountingError, ResourceSet, CPU_RESOURCE_LABEL};
use crate::wire::{self, ResourceRecord};

/// Slot id assigned to dynamically created slots that were never tied to a physical
/// identifier. Many slots may carry it at once; it is a tag, not a key.
pub const DYNAMIC_RESOURCE_ID: i64 = -1;

/// The available slots of a single resource.
///
/// `whole_ids` holds fully-available slots. `fractional_ids` holds at most one entry
/// per slot id, whose residual in (0, 1) is what remains after tasks took sub-slot
/// pieces. `total_capacity` is the advertised capacity, which may exceed what is
/// currently here plus what is out with tasks while a decrease is pending.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIds {
    whole_ids: Vec<i64>,
    fractional_ids: Vec<(i64, FixedPoint)>,
    total_capacity: FixedPoint,
    decrement_backlog: i64,
}

impl ResourceIds {
    /// A ledger with `quantity` whole slots, ids `0..quantity`.
    ///
    /// `quantity` must be a non-negative whole number: a resource cannot come into
    /// existence with a fraction of a slot.
    pub fn new(quantity: FixedPoint) -> Result<Self, AccountingError> {
        if !quantity.is_whole() || quantity < FixedPoint::ZERO {
            return Err(AccountingError::InvariantViolated(format!(
                "slot ledger constructed with invalid capacity {quantity}"
            )));
        }
        let whole_ids: Vec<i64> = (0..quantity.trunc()).collect();
        Ok(ResourceIds {
            whole_ids,
            fractional_ids: Vec::new(),
            total_capacity: quantity,
            decrement_backlog: 0,
        })
    }

    pub fn from_whole_ids(whole_ids: Vec<i64>) -> Self {
        let total_capacity = FixedPoint::from(whole_ids.len() as i64);
        ResourceIds {
            whole_ids,
            fractional_ids: Vec::new(),
            total_capacity,
            decrement_backlog: 0,
        }
    }

    pub fn from_fractional_ids(fractional_ids: Vec<(i64, FixedPoint)>) -> Self {
        let mut ids = ResourceIds {
            whole_ids: Vec::new(),
            fractional_ids,
            total_capacity: FixedPoint::ZERO,
            decrement_backlog: 0,
        };
        ids.total_capacity = ids.total_quantity();
        ids
    }

    pub fn from_parts(whole_ids: Vec<i64>, fractional_ids: Vec<(i64, FixedPoint)>) -> Self {
        let mut ids = ResourceIds {
            whole_ids,
            fractional_ids,
            total_capacity: FixedPoint::ZERO,
            decrement_backlog: 0,
        };
        ids.total_capacity = ids.total_quantity();
        ids
    }

    pub fn whole_ids(&self) -> &[i64] {
        &self.whole_ids
    }

    pub fn fractional_ids(&self) -> &[(i64, FixedPoint)] {
        &self.fractional_ids
    }

    pub fn total_capacity(&self) -> FixedPoint {
        self.total_capacity
    }

    pub fn decrement_backlog(&self) -> i64 {
        self.decrement_backlog
    }

    /// Whether an acquire of `quantity` would succeed right now.
    ///
    /// A fractional request can be satisfied by carving from a whole slot even when
    /// every existing residual is smaller than the request.
    pub fn contains(&self, quantity: FixedPoint) -> bool {
        if quantity < FixedPoint::ONE {
            return !self.whole_ids.is_empty()
                || self
                    .fractional_ids
                    .iter()
                    .any(|(_, residual)| *residual >= quantity);
        }
        let whole = quantity.trunc();
        let fraction = quantity - FixedPoint::from(whole);
        let whole_available = self.whole_ids.len() as i64;
        if fraction == FixedPoint::ZERO {
            return whole_available >= whole;
        }
        // The fractional remainder needs a slot beyond the `whole` taken outright.
        whole_available > whole
            || (whole_available >= whole
                && self
                    .fractional_ids
                    .iter()
                    .any(|(_, residual)| *residual >= fraction))
    }

    /// Takes `quantity` from this ledger and returns exactly the slots taken.
    ///
    /// Whole units pop from the tail of `whole_ids`, so recently-released slots are
    /// reused first. A fractional remainder is served from the first residual large
    /// enough, falling back to carving a fresh whole slot.
    pub fn acquire(&mut self, quantity: FixedPoint) -> Result<ResourceIds, AccountingError> {
        if quantity < FixedPoint::ONE {
            let piece = self.acquire_fraction(quantity)?;
            return Ok(ResourceIds::from_fractional_ids(vec![piece]));
        }

        let whole = quantity.trunc();
        let fraction = quantity - FixedPoint::from(whole);
        if fraction > FixedPoint::ZERO && !self.contains(quantity) {
            // A mixed request must not take its whole slots and then fail on the
            // fractional remainder.
            return Err(AccountingError::InvariantViolated(format!(
                "acquire of {quantity} exceeds what is available"
            )));
        }
        let taken = self.acquire_whole(whole)?;
        if fraction == FixedPoint::ZERO {
            return Ok(ResourceIds::from_whole_ids(taken));
        }
        let piece = self.acquire_fraction(fraction)?;
        Ok(ResourceIds::from_parts(taken, vec![piece]))
    }

    fn acquire_whole(&mut self, count: i64) -> Result<Vec<i64>, AccountingError> {
        if (self.whole_ids.len() as i64) < count {
            return Err(AccountingError::InvariantViolated(format!(
                "acquire of {count} whole slots exceeds the {} available",
                self.whole_ids.len()
            )));
        }
        let mut taken = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if let Some(slot_id) = self.whole_ids.pop() {
                taken.push(slot_id);
            }
        }
        Ok(taken)
    }

    fn acquire_fraction(
        &mut self,
        quantity: FixedPoint,
    ) -> Result<(i64, FixedPoint), AccountingError> {
        for index in 0..self.fractional_ids.len() {
            if self.fractional_ids[index].1 >= quantity {
                let slot_id = self.fractional_ids[index].0;
                self.fractional_ids[index].1 -= quantity;
                if self.fractional_ids[index].1 == FixedPoint::ZERO {
                    // Order within fractional_ids carries no meaning.
                    self.fractional_ids.swap_remove(index);
                }
                return Ok((slot_id, quantity));
            }
        }

        // No residual is large enough: carve a fresh whole slot.
        let Some(slot_id) = self.whole_ids.pop() else {
            return Err(AccountingError::InvariantViolated(format!(
                "acquire of {quantity} with no slot available to carve from"
            )));
        };
        self.fractional_ids
            .push((slot_id, FixedPoint::ONE - quantity));
        Ok((slot_id, quantity))
    }

    /// Absorbs `returned`'s slots back into this ledger.
    ///
    /// While a decrement backlog is pending, returned whole slots — including slots
    /// completed by their final fractional piece — are swallowed by the backlog
    /// instead of becoming available.
    pub fn release(&mut self, returned: &ResourceIds) -> Result<(), AccountingError> {
        for (slot_id, fraction) in &returned.fractional_ids {
            if let Some((_, residual)) =
                self.fractional_ids.iter().find(|(id, _)| id == slot_id)
            {
                if *residual + *fraction > FixedPoint::ONE {
                    return Err(AccountingError::InvariantViolated(format!(
                        "released fraction {fraction} of slot {slot_id} would raise its \
                         residual above one"
                    )));
                }
            }
        }

        let returned_count = returned.whole_ids.len() as i64;
        if returned_count > self.decrement_backlog {
            self.whole_ids
                .extend_from_slice(&returned.whole_ids[self.decrement_backlog as usize..]);
            self.decrement_backlog = 0;
        } else {
            self.decrement_backlog -= returned_count;
        }

        for (slot_id, fraction) in &returned.fractional_ids {
            match self.fractional_ids.iter().position(|(id, _)| id == slot_id) {
                None => self.fractional_ids.push((*slot_id, *fraction)),
                Some(index) => {
                    self.fractional_ids[index].1 += *fraction;
                    if self.fractional_ids[index].1 == FixedPoint::ONE {
                        // Every piece is back: the slot is whole again.
                        self.fractional_ids.remove(index);
                        if self.decrement_backlog > 0 {
                            self.decrement_backlog -= 1;
                        } else {
                            self.whole_ids.push(*slot_id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Non-destructive combination of two ledgers.
    pub fn plus(&self, other: &ResourceIds) -> Result<ResourceIds, AccountingError> {
        let mut combined = self.clone();
        combined.release(other)?;
        Ok(combined)
    }

    /// Whole slots plus the sum of fractional residuals.
    pub fn total_quantity(&self) -> FixedPoint {
        let mut total = FixedPoint::from(self.whole_ids.len() as i64);
        for (_, residual) in &self.fractional_ids {
            total += *residual;
        }
        total
    }

    /// True iff nothing is available here, ignoring advertised capacity and backlog.
    pub fn total_quantity_is_zero(&self) -> bool {
        self.whole_ids.is_empty() && self.fractional_ids.is_empty()
    }

    /// Moves the advertised capacity to `new_capacity`, growing or shrinking the
    /// available slots accordingly. A shrink below what is currently available is
    /// honored logically via the decrement backlog.
    pub fn update_capacity(&mut self, new_capacity: i64) -> Result<(), AccountingError> {
        if new_capacity < 0 {
            return Err(AccountingError::InvariantViolated(format!(
                "resource capacity must be non-negative, got {new_capacity}"
            )));
        }
        let delta = (new_capacity as f64 - self.total_capacity.to_f64()) as i64;
        if delta < 0 {
            self.decrease_capacity(-delta)?;
        } else {
            self.increase_capacity(delta);
        }
        self.total_capacity = FixedPoint::from(new_capacity);
        Ok(())
    }

    fn increase_capacity(&mut self, increment: i64) {
        // A pending decrease cancels out first; only the remainder creates slots.
        let created = (increment - self.decrement_backlog).max(0);
        self.decrement_backlog = (self.decrement_backlog - increment).max(0);
        for _ in 0..created {
            self.whole_ids.push(DYNAMIC_RESOURCE_ID);
        }
    }

    fn decrease_capacity(&mut self, decrement: i64) -> Result<(), AccountingError> {
        // Decreases operate on whole units; fractional residuals are truncated away.
        let available = self.total_quantity().trunc();
        log::debug!("decreasing capacity by {decrement}, {available} whole units available");
        if available < decrement {
            // More slots are out with tasks than the new total permits. The
            // difference is absorbed as returns come in.
            self.decrement_backlog += decrement - available;
            if available > 0 {
                self.acquire(FixedPoint::from(available))?;
            }
        } else {
            self.acquire(FixedPoint::from(decrement))?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ResourceIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole: Vec<String> = self.whole_ids.iter().map(|id| id.to_string()).collect();
        let fractional: Vec<String> = self
            .fractional_ids
            .iter()
            .map(|(id, residual)| format!("({id}, {residual})"))
            .collect();
        write!(
            f,
            "Whole IDs: [{}], Fractional IDs: [{}]",
            whole.join(", "),
            fractional.join(", ")
        )
    }
}

/// Slot ledgers for every resource a node currently has available.
///
/// A resource whose ledger becomes fully empty is evicted from the map; it reappears
/// when its slots are released back.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdSet {
    available: HashMap<String, ResourceIds>,
}

impl ResourceIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One ledger per entry of `resources`; every quantity must be a whole number.
    pub fn from_resource_set(resources: &ResourceSet) -> Result<Self, AccountingError> {
        let mut available = HashMap::new();
        for (name, quantity) in resources.amounts() {
            available.insert(name.clone(), ResourceIds::new(*quantity)?);
        }
        Ok(ResourceIdSet { available })
    }

    pub fn from_map(available: HashMap<String, ResourceIds>) -> Self {
        ResourceIdSet { available }
    }

    pub fn available_resources(&self) -> &HashMap<String, ResourceIds> {
        &self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Whether every entry of `demand` can be acquired right now.
    pub fn contains(&self, demand: &ResourceSet) -> bool {
        demand.amounts().iter().all(|(name, quantity)| {
            self.available
                .get(name)
                .is_some_and(|ids| ids.contains(*quantity))
        })
    }

    /// Acquires `demand` and returns exactly the slots taken, one ledger per
    /// resource. On error nothing has been acquired.
    pub fn acquire(&mut self, demand: &ResourceSet) -> Result<ResourceIdSet, AccountingError> {
        for (name, quantity) in demand.amounts() {
            let ids = self
                .available
                .get(name)
                .ok_or_else(|| AccountingError::UnknownResource(name.clone()))?;
            if !ids.contains(*quantity) {
                return Err(AccountingError::InvariantViolated(format!(
                    "acquire of {quantity} {name} exceeds what the node has available"
                )));
            }
        }

        let mut acquired = HashMap::new();
        for (name, quantity) in demand.amounts() {
            let ids = self
                .available
                .get_mut(name)
                .ok_or_else(|| AccountingError::UnknownResource(name.clone()))?;
            acquired.insert(name.clone(), ids.acquire(*quantity)?);
            if ids.total_quantity_is_zero() {
                self.available.remove(name);
            }
        }
        Ok(ResourceIdSet {
            available: acquired,
        })
    }

    /// Releases `returned`'s slots back, resource by resource. A resource with no
    /// ledger here (evicted when it ran dry) is reinstated with the returned slots.
    pub fn release(&mut self, returned: &ResourceIdSet) -> Result<(), AccountingError> {
        for (name, ids) in &returned.available {
            if ids.total_quantity_is_zero() {
                return Err(AccountingError::InvariantViolated(format!(
                    "release of an empty slot ledger for resource {name}"
                )));
            }
        }
        for (name, ids) in &returned.available {
            match self.available.get_mut(name) {
                Some(mine) => mine.release(ids)?,
                None => {
                    self.available.insert(name.clone(), ids.clone());
                }
            }
        }
        Ok(())
    }

    /// Like [`ResourceIdSet::release`], but a resource absent from `total` is
    /// silently dropped: slots of a deleted resource must not come back to life.
    pub fn release_constrained(
        &mut self,
        returned: &ResourceIdSet,
        total: &ResourceSet,
    ) -> Result<(), AccountingError> {
        for (name, ids) in &returned.available {
            if total.get(name) == FixedPoint::ZERO {
                continue;
            }
            if ids.total_quantity_is_zero() {
                return Err(AccountingError::InvariantViolated(format!(
                    "release of an empty slot ledger for resource {name}"
                )));
            }
        }
        for (name, ids) in &returned.available {
            if total.get(name) == FixedPoint::ZERO {
                log::debug!(
                    "resource {name} is gone from the total capacity, dropping its returned slots"
                );
                continue;
            }
            match self.available.get_mut(name) {
                Some(mine) => mine.release(ids)?,
                None => {
                    self.available.insert(name.clone(), ids.clone());
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.available.clear();
    }

    /// Non-destructive combination of two sets.
    pub fn plus(&self, other: &ResourceIdSet) -> Result<ResourceIdSet, AccountingError> {
        let mut combined = self.clone();
        combined.release(other)?;
        Ok(combined)
    }

    /// Updates the capacity of `resource_name`, creating a fresh ledger with slot
    /// ids `0..capacity` if the resource is new to this node.
    pub fn add_or_update_resource(
        &mut self,
        resource_name: &str,
        capacity: i64,
    ) -> Result<(), AccountingError> {
        match self.available.get_mut(resource_name) {
            Some(ids) => ids.update_capacity(capacity),
            None => {
                self.available.insert(
                    resource_name.to_string(),
                    ResourceIds::new(FixedPoint::from(capacity))?,
                );
                Ok(())
            }
        }
    }

    /// Removes the resource. Slot assignments still out with tasks are orphaned;
    /// [`ResourceIdSet::release_constrained`] drops them safely on return.
    pub fn delete_resource(&mut self, resource_name: &str) {
        self.available.remove(resource_name);
    }

    /// Projection returning just the CPU ledger.
    pub fn get_cpu_resources(&self) -> ResourceIdSet {
        let mut cpu = HashMap::new();
        if let Some(ids) = self.available.get(CPU_RESOURCE_LABEL) {
            cpu.insert(CPU_RESOURCE_LABEL.to_string(), ids.clone());
        }
        ResourceIdSet { available: cpu }
    }

    /// Collapses each ledger to its total quantity.
    pub fn to_resource_set(&self) -> ResourceSet {
        let mut resources = ResourceSet::new();
        for (name, ids) in &self.available {
            resources.add_or_update(name, ids.total_quantity());
        }
        resources
    }

    /// Snapshot records for the external wire format: per resource, parallel arrays
    /// of slot ids and fractions, whole slots first with fraction exactly 1.
    pub fn to_records(&self) -> Vec<ResourceRecord> {
        let mut records: Vec<ResourceRecord> = self
            .available
            .iter()
            .map(|(name, ids)| {
                let mut slot_ids = Vec::with_capacity(
                    ids.whole_ids().len() + ids.fractional_ids().len(),
                );
                let mut fractions = Vec::with_capacity(slot_ids.capacity());
                for slot_id in ids.whole_ids() {
                    slot_ids.push(*slot_id);
                    fractions.push(1.0);
                }
                for (slot_id, residual) in ids.fractional_ids() {
                    slot_ids.push(*slot_id);
                    fractions.push(residual.to_f64());
                }
                ResourceRecord {
                    name: name.clone(),
                    ids: slot_ids,
                    fractions,
                }
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Length-prefixed byte snapshot of the whole set.
    pub fn serialize(&self) -> Vec<u8> {
        wire::encode(&self.to_records())
    }
}

impl std::fmt::Display for ResourceIdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.available.keys().collect();
        names.sort();
        let rendered: Vec<String> = names
            .into_iter()
            .map(|name| format!("{}: {{{}}}", name, self.available[name]))
            .collect();
        write!(f, "AvailableResources: {}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(value: f64) -> FixedPoint {
        FixedPoint::from_f64(value)
    }

    fn ledger(capacity: i64) -> ResourceIds {
        ResourceIds::new(FixedPoint::from(capacity)).unwrap()
    }

    fn demand(entries: &[(&str, f64)]) -> ResourceSet {
        ResourceSet::from_f64_map(
            entries
                .iter()
                .map(|(name, quantity)| (name.to_string(), *quantity))
                .collect(),
        )
        .unwrap()
    }

    // ============================================================================
    // ResourceIds: construction and queries
    // ============================================================================

    #[test]
    fn test_new_populates_sequential_ids() {
        let ids = ledger(4);
        assert_eq!(ids.whole_ids(), &[0, 1, 2, 3]);
        assert!(ids.fractional_ids().is_empty());
        assert_eq!(ids.total_capacity(), FixedPoint::from(4i64));
        assert_eq!(ids.decrement_backlog(), 0);
    }

    #[test]
    fn test_new_rejects_fractional_capacity() {
        match ResourceIds::new(fp(2.5)).unwrap_err() {
            AccountingError::InvariantViolated(_) => {}
            other => panic!("expected InvariantViolated, got {other:?}"),
        }
        assert!(ResourceIds::new(fp(-1.0)).is_err());
    }

    #[test]
    fn test_contains_whole_and_fractional() {
        let mut ids = ledger(2);
        assert!(ids.contains(FixedPoint::from(2i64)));
        assert!(!ids.contains(FixedPoint::from(3i64)));
        // A 0.3 request can be carved from a whole slot.
        assert!(ids.contains(fp(0.3)));

        // Drain the whole slots into one small residual.
        ids.acquire(FixedPoint::from(1i64)).unwrap();
        ids.acquire(fp(0.8)).unwrap();
        assert_eq!(ids.whole_ids().len(), 0);
        assert!(ids.contains(fp(0.2)));
        assert!(!ids.contains(fp(0.3)));
    }

    #[test]
    fn test_contains_mixed_quantity() {
        let ids = ledger(2);
        // 1.5 needs one whole slot plus a second slot to carve from.
        assert!(ids.contains(fp(1.5)));
        assert!(!ids.contains(fp(2.5)));

        let mut ids = ledger(2);
        ids.acquire(fp(0.5)).unwrap();
        // One whole slot left and a 0.5 residual: 1.5 still fits, 1.6 does not.
        assert!(ids.contains(fp(1.5)));
        assert!(!ids.contains(fp(1.6)));
    }

    // ============================================================================
    // ResourceIds: acquire
    // ============================================================================

    #[test]
    fn test_acquire_whole_pops_from_tail() {
        let mut ids = ledger(4);
        let taken = ids.acquire(FixedPoint::from(2i64)).unwrap();
        assert_eq!(taken.whole_ids(), &[3, 2]);
        assert_eq!(ids.whole_ids(), &[0, 1]);
        assert_eq!(taken.total_quantity(), FixedPoint::from(2i64));
    }

    #[test]
    fn test_acquire_more_than_available_fails() {
        let mut ids = ledger(1);
        let before = ids.clone();
        assert!(ids.acquire(FixedPoint::from(2i64)).is_err());
        assert_eq!(ids, before);
    }

    #[test]
    fn test_acquire_fraction_carves_whole_slot() {
        let mut ids = ledger(4);
        let taken = ids.acquire(fp(0.5)).unwrap();
        assert_eq!(taken.fractional_ids(), &[(3, fp(0.5))]);
        assert_eq!(ids.whole_ids(), &[0, 1, 2]);
        assert_eq!(ids.fractional_ids(), &[(3, fp(0.5))]);
    }

    #[test]
    fn test_acquire_fraction_prefers_existing_residual() {
        let mut ids = ledger(4);
        ids.acquire(fp(0.3)).unwrap();
        let taken = ids.acquire(fp(0.3)).unwrap();
        // Same slot keeps being carved; no second whole slot is broken.
        assert_eq!(taken.fractional_ids(), &[(3, fp(0.3))]);
        assert_eq!(ids.whole_ids().len(), 3);
        assert_eq!(ids.fractional_ids(), &[(3, fp(0.4))]);
    }

    #[test]
    fn test_three_small_acquires_share_one_slot() {
        let mut ids = ledger(4);
        for _ in 0..3 {
            ids.acquire(fp(0.3)).unwrap();
        }
        assert_eq!(ids.whole_ids().len(), 3);
        assert_eq!(ids.fractional_ids(), &[(3, fp(0.1))]);
    }

    #[test]
    fn test_acquire_exhausting_a_residual_removes_it() {
        let mut ids = ledger(1);
        ids.acquire(fp(0.6)).unwrap();
        let taken = ids.acquire(fp(0.4)).unwrap();
        assert_eq!(taken.fractional_ids(), &[(0, fp(0.4))]);
        assert!(ids.total_quantity_is_zero());
    }

    #[test]
    fn test_acquire_mixed_takes_wholes_then_carves() {
        let mut ids = ledger(4);
        let taken = ids.acquire(fp(1.5)).unwrap();
        assert_eq!(taken.whole_ids(), &[3]);
        assert_eq!(taken.fractional_ids(), &[(2, fp(0.5))]);
        assert_eq!(ids.whole_ids(), &[0, 1]);
        assert_eq!(ids.fractional_ids(), &[(2, fp(0.5))]);
        assert_eq!(ids.total_quantity(), fp(2.5));
    }

    #[test]
    fn test_acquire_mixed_without_room_for_fraction_is_atomic() {
        let mut ids = ledger(1);
        let before = ids.clone();
        // One whole slot covers the integral part but leaves nothing to carve.
        assert!(ids.acquire(fp(1.5)).is_err());
        assert_eq!(ids, before);
    }

    // ============================================================================
    // ResourceIds: release
    // ============================================================================

    #[test]
    fn test_release_preserves_lifo_reuse() {
        let mut ids = ledger(4);
        let first = ids.acquire(FixedPoint::from(1i64)).unwrap();
        let second = ids.acquire(FixedPoint::from(1i64)).unwrap();
        assert_eq!(first.whole_ids(), &[3]);
        assert_eq!(second.whole_ids(), &[2]);

        ids.release(&first).unwrap();
        ids.release(&second).unwrap();
        assert_eq!(ids.whole_ids(), &[0, 1, 3, 2]);
    }

    #[test]
    fn test_fractional_pieces_recompose_in_any_order() {
        // Split one slot into 0.5 + 0.25 + 0.25 and try every return order.
        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in permutations {
            let mut ids = ledger(1);
            let pieces = [
                ids.acquire(fp(0.5)).unwrap(),
                ids.acquire(fp(0.25)).unwrap(),
                ids.acquire(fp(0.25)).unwrap(),
            ];
            assert!(ids.total_quantity_is_zero());
            for index in order {
                ids.release(&pieces[index]).unwrap();
            }
            assert_eq!(ids.whole_ids(), &[0]);
            assert!(ids.fractional_ids().is_empty());
        }
    }

    #[test]
    fn test_release_rejects_residual_above_one() {
        let mut ids = ledger(1);
        ids.acquire(fp(0.5)).unwrap();
        let bogus = ResourceIds::from_fractional_ids(vec![(0, fp(0.6))]);
        match ids.release(&bogus).unwrap_err() {
            AccountingError::InvariantViolated(_) => {}
            other => panic!("expected InvariantViolated, got {other:?}"),
        }
        // The 0.5 residual must still be there untouched.
        assert_eq!(ids.fractional_ids(), &[(0, fp(0.5))]);
    }

    #[test]
    fn test_release_of_unknown_fraction_is_inserted() {
        let mut ids = ledger(1);
        let foreign = ResourceIds::from_fractional_ids(vec![(7, fp(0.25))]);
        ids.release(&foreign).unwrap();
        assert_eq!(ids.fractional_ids(), &[(7, fp(0.25))]);
    }

    #[test]
    fn test_conservation_through_acquire_release_cycles() {
        let mut ids = ledger(5);
        let total = FixedPoint::from(5i64);
        let a = ids.acquire(fp(2.0)).unwrap();
        let b = ids.acquire(fp(0.75)).unwrap();
        let c = ids.acquire(fp(1.5)).unwrap();
        let outstanding = a.total_quantity() + b.total_quantity() + c.total_quantity();
        assert_eq!(ids.total_quantity() + outstanding, total);

        ids.release(&b).unwrap();
        ids.release(&c).unwrap();
        ids.release(&a).unwrap();
        assert_eq!(ids.total_quantity(), total);
    }

    // ============================================================================
    // ResourceIds: capacity updates and the decrement backlog
    // ============================================================================

    #[test]
    fn test_increase_capacity_appends_dynamic_ids() {
        let mut ids = ledger(2);
        ids.update_capacity(4).unwrap();
        assert_eq!(ids.whole_ids(), &[0, 1, DYNAMIC_RESOURCE_ID, DYNAMIC_RESOURCE_ID]);
        assert_eq!(ids.total_capacity(), FixedPoint::from(4i64));
    }

    #[test]
    fn test_decrease_capacity_with_enough_available() {
        let mut ids = ledger(4);
        ids.update_capacity(2).unwrap();
        assert_eq!(ids.whole_ids(), &[0, 1]);
        assert_eq!(ids.decrement_backlog(), 0);
        assert_eq!(ids.total_capacity(), FixedPoint::from(2i64));
    }

    #[test]
    fn test_decrease_capacity_under_load_builds_backlog() {
        let mut ids = ledger(2);
        let held = ids.acquire(FixedPoint::from(1i64)).unwrap();
        // Only one slot is here; shrinking to zero owes one more.
        ids.update_capacity(0).unwrap();
        assert!(ids.total_quantity_is_zero());
        assert_eq!(ids.decrement_backlog(), 1);
        assert_eq!(ids.total_capacity(), FixedPoint::ZERO);

        // The held slot comes back and is absorbed, not restored.
        ids.release(&held).unwrap();
        assert!(ids.total_quantity_is_zero());
        assert_eq!(ids.decrement_backlog(), 0);
    }

    #[test]
    fn test_backlog_absorbs_leading_whole_returns() {
        let mut ids = ledger(4);
        let held = ids.acquire(FixedPoint::from(3i64)).unwrap();
        ids.update_capacity(1).unwrap();
        // One slot was reclaimed directly; two more are owed.
        assert_eq!(ids.decrement_backlog(), 2);
        assert!(ids.total_quantity_is_zero());

        // Of the three returns, the first two feed the backlog.
        ids.release(&held).unwrap();
        assert_eq!(ids.decrement_backlog(), 0);
        assert_eq!(ids.whole_ids().len(), 1);
        assert_eq!(ids.total_quantity(), FixedPoint::from(1i64));
    }

    #[test]
    fn test_backlog_absorbs_fractional_completion() {
        let mut ids = ledger(1);
        let piece_a = ids.acquire(fp(0.5)).unwrap();
        let piece_b = ids.acquire(fp(0.5)).unwrap();
        ids.update_capacity(0).unwrap();
        assert_eq!(ids.decrement_backlog(), 1);

        // The slot becomes whole on the second return and is swallowed.
        ids.release(&piece_a).unwrap();
        assert_eq!(ids.fractional_ids(), &[(0, fp(0.5))]);
        ids.release(&piece_b).unwrap();
        assert!(ids.total_quantity_is_zero());
        assert_eq!(ids.decrement_backlog(), 0);
    }

    #[test]
    fn test_increase_cancels_pending_backlog() {
        let mut ids = ledger(2);
        let held = ids.acquire(FixedPoint::from(2i64)).unwrap();
        ids.update_capacity(0).unwrap();
        assert_eq!(ids.decrement_backlog(), 2);

        // Growing by one consumes backlog without creating a slot.
        ids.update_capacity(1).unwrap();
        assert_eq!(ids.decrement_backlog(), 1);
        assert!(ids.whole_ids().is_empty());

        // Growing past the backlog creates dynamic slots for the remainder.
        ids.update_capacity(3).unwrap();
        assert_eq!(ids.decrement_backlog(), 0);
        assert_eq!(ids.whole_ids(), &[DYNAMIC_RESOURCE_ID]);

        // Both originally-held slots are still owed to nobody: they return normally.
        ids.release(&held).unwrap();
        assert_eq!(ids.total_quantity(), FixedPoint::from(3i64));
    }

    #[test]
    fn test_update_capacity_rejects_negative() {
        let mut ids = ledger(2);
        assert!(ids.update_capacity(-1).is_err());
    }

    // ============================================================================
    // ResourceIdSet
    // ============================================================================

    #[test]
    fn test_set_acquire_and_release_round_trip() {
        let total = demand(&[("CPU", 4.0), ("GPU", 2.0)]);
        let mut set = ResourceIdSet::from_resource_set(&total).unwrap();
        let before = set.clone();

        let request = demand(&[("CPU", 1.5), ("GPU", 1.0)]);
        assert!(set.contains(&request));
        let taken = set.acquire(&request).unwrap();
        assert_eq!(taken.to_resource_set(), request);

        set.release(&taken).unwrap();
        assert_eq!(set.to_resource_set(), before.to_resource_set());
    }

    #[test]
    fn test_set_acquire_unknown_resource_is_atomic() {
        let mut set =
            ResourceIdSet::from_resource_set(&demand(&[("CPU", 2.0)])).unwrap();
        let before = set.clone();
        let result = set.acquire(&demand(&[("CPU", 1.0), ("GPU", 1.0)]));
        match result.unwrap_err() {
            AccountingError::UnknownResource(name) => assert_eq!(name, "GPU"),
            other => panic!("expected UnknownResource, got {other:?}"),
        }
        // The CPU ledger must not have been touched.
        assert_eq!(set, before);
    }

    #[test]
    fn test_set_evicts_exhausted_ledger() {
        let mut set =
            ResourceIdSet::from_resource_set(&demand(&[("CPU", 2.0)])).unwrap();
        let taken = set.acquire(&demand(&[("CPU", 2.0)])).unwrap();
        assert!(set.is_empty());

        // Releasing reinstates the ledger wholesale.
        set.release(&taken).unwrap();
        assert_eq!(
            set.to_resource_set().get("CPU"),
            FixedPoint::from(2i64)
        );
    }

    #[test]
    fn test_set_release_rejects_empty_donor_ledger() {
        let mut set = ResourceIdSet::new();
        let donor = ResourceIdSet::from_map(HashMap::from([(
            "CPU".to_string(),
            ResourceIds::from_whole_ids(Vec::new()),
        )]));
        assert!(set.release(&donor).is_err());
    }

    #[test]
    fn test_release_constrained_drops_deleted_resources() {
        let total = demand(&[("CPU", 2.0)]);
        let mut set = ResourceIdSet::from_resource_set(&total).unwrap();
        let taken = set.acquire(&demand(&[("CPU", 1.0)])).unwrap();

        set.delete_resource("CPU");
        let remaining = demand(&[("GPU", 1.0)]);
        set.release_constrained(&taken, &remaining).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_add_or_update_creates_fresh_ledger() {
        let mut set = ResourceIdSet::new();
        set.add_or_update_resource("custom", 3).unwrap();
        let ids = &set.available_resources()["custom"];
        assert_eq!(ids.whole_ids(), &[0, 1, 2]);

        set.add_or_update_resource("custom", 5).unwrap();
        let ids = &set.available_resources()["custom"];
        assert_eq!(ids.total_capacity(), FixedPoint::from(5i64));
        assert_eq!(
            &ids.whole_ids()[3..],
            &[DYNAMIC_RESOURCE_ID, DYNAMIC_RESOURCE_ID]
        );
    }

    #[test]
    fn test_delete_resource_is_idempotent() {
        let mut set =
            ResourceIdSet::from_resource_set(&demand(&[("CPU", 2.0)])).unwrap();
        set.delete_resource("CPU");
        set.delete_resource("CPU");
        assert!(set.is_empty());
    }

    #[test]
    fn test_get_cpu_resources_projection() {
        let set =
            ResourceIdSet::from_resource_set(&demand(&[("CPU", 2.0), ("GPU", 1.0)]))
                .unwrap();
        let cpus = set.get_cpu_resources();
        assert_eq!(cpus.available_resources().len(), 1);
        assert!(cpus.available_resources().contains_key("CPU"));
        assert!(set.get_cpu_resources().available_resources()["CPU"]
            .contains(FixedPoint::from(2i64)));
    }

    #[test]
    fn test_records_list_wholes_before_fractions() {
        let mut set =
            ResourceIdSet::from_resource_set(&demand(&[("GPU", 2.0)])).unwrap();
        set.acquire(&demand(&[("GPU", 0.75)])).unwrap();

        let records = set.to_records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "GPU");
        assert_eq!(record.ids, vec![0, 1]);
        assert_eq!(record.fractions, vec![1.0, 0.25]);
    }

    #[test]
    fn test_display_formats() {
        let mut ids = ledger(2);
        ids.acquire(fp(0.5)).unwrap();
        assert_eq!(
            ids.to_string(),
            "Whole IDs: [0], Fractional IDs: [(1, 0.5)]"
        );

        let set = ResourceIdSet::from_map(HashMap::from([("CPU".to_string(), ids)]));
        assert_eq!(
            set.to_string(),
            "AvailableResources: CPU: {Whole IDs: [0], Fractional IDs: [(1, 0.5)]}"
        );
    }
}
