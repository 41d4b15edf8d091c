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

//! Node-local resource accounting for a distributed task scheduler.
//!
//! A node tracks named resources (CPU, GPU, memory, arbitrary custom labels) in
//! three coupled views — total, available, and load — and, for consumers that care
//! about *which* unit they got, an identity-preserving ledger of individual slots
//! and their fractional pieces. Capacity can change at runtime, including shrinking
//! below what tasks currently hold: the books absorb the difference as work
//! completes rather than revoking anything.
//!
//! The layers, leaf first:
//!
//! - [`FixedPoint`]: exact decimal quantities, so repeated acquire/release cycles
//!   return to exactly zero.
//! - [`ResourceSet`]: name → quantity maps with set algebra and non-negativity.
//! - [`ResourceIds`] / [`ResourceIdSet`]: per-slot bookkeeping, fractional
//!   carving and recomposition, and shrink-under-load via the decrement backlog.
//! - [`SchedulingResources`]: the per-node façade the scheduler drives.
//!
//! Nothing here is internally synchronized: the owner is the node's scheduler
//! loop, and all operations are synchronous and bounded. Scheduling policy,
//! cluster-wide views, and state propagation live elsewhere; this crate only
//! exposes consistent books.

pub mod fixed_point;
pub mod kv;
pub mod resource_ids;
pub mod resource_set;
pub mod scheduling;
pub mod wire;

pub use fixed_point::FixedPoint;
pub use kv::{KvAccessor, KvCallback, KvError, KvResult};
pub use resource_ids::{ResourceIds, ResourceIdSet, DYNAMIC_RESOURCE_ID};
pub use resource_set::{
    AccountingError, ResourceSet, CPU_RESOURCE_LABEL, GPU_RESOURCE_LABEL, MEMORY_RESOURCE_LABEL,
    OBJECT_STORE_MEMORY_RESOURCE_LABEL,
};
pub use scheduling::SchedulingResources;
pub use wire::{ResourceRecord, WireError};
