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

//! Blocking adapter over the callback-style key-value accessor.
//!
//! The cluster's metadata store exposes an asynchronous interface: each call takes a
//! completion callback. Some node-side code paths are synchronous and just want the
//! answer, so the trait's provided methods park the caller on a rendezvous channel
//! until the callback fires. The transport is an explicit collaborator supplied by
//! the implementor, never process-wide state.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum KvError {
    /// The only normal-return status: a Get on a missing key.
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("kv backend error: {0}")]
    Backend(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// Completion callback for an asynchronous KV operation.
pub type KvCallback<T> = Box<dyn FnOnce(KvResult<T>) + Send + 'static>;

/// Asynchronous key-value accessor with blocking convenience methods.
///
/// Implementors provide the `*_async` methods; the callback may fire on any thread.
/// The blocking wrappers are provided.
pub trait KvAccessor {
    /// `Ok(None)` means the key does not exist.
    fn get_async(&self, key: &str, callback: KvCallback<Option<String>>);

    /// The optional payload is the backend's count of newly added entries.
    fn put_async(&self, key: &str, value: &str, overwrite: bool, callback: KvCallback<Option<i64>>);

    fn del_async(&self, key: &str, callback: KvCallback<()>);

    fn keys_async(&self, prefix: &str, callback: KvCallback<Option<Vec<String>>>);

    fn exists_async(&self, key: &str, callback: KvCallback<Option<bool>>);

    /// Blocking get. A missing key is reported as [`KvError::NotFound`].
    fn get(&self, key: &str) -> KvResult<String> {
        let key_owned = key.to_string();
        match wait(|callback| self.get_async(key, callback))? {
            Some(value) => Ok(value),
            None => Err(KvError::NotFound(key_owned)),
        }
    }

    /// Blocking put. Returns whether the entry was newly added; a backend that
    /// reports no added-count is treated as having added nothing.
    fn put(&self, key: &str, value: &str, overwrite: bool) -> KvResult<bool> {
        let added_num = wait(|callback| self.put_async(key, value, overwrite, callback))?;
        Ok(added_num.unwrap_or(0) != 0)
    }

    fn del(&self, key: &str) -> KvResult<()> {
        wait(|callback| self.del_async(key, callback))
    }

    fn keys(&self, prefix: &str) -> KvResult<Vec<String>> {
        let keys = wait(|callback| self.keys_async(prefix, callback))?;
        Ok(keys.unwrap_or_default())
    }

    fn exists(&self, key: &str) -> KvResult<bool> {
        let exists = wait(|callback| self.exists_async(key, callback))?;
        Ok(exists.unwrap_or(false))
    }
}

/// Runs one callback-style operation and blocks until its callback fires.
fn wait<T, F>(start: F) -> KvResult<T>
where
    T: Send + 'static,
    F: FnOnce(KvCallback<T>),
{
    let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
    start(Box::new(move |result| {
        let _ = reply_tx.send(result);
    }));
    match reply_rx.recv() {
        Ok(result) => result,
        Err(_) => Err(KvError::Backend(
            "kv operation dropped its callback without replying".to_string(),
        )),
    }
}
