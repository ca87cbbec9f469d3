//! User preferences persisted alongside the tag sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::foundation::core::FilterTarget;
use crate::foundation::error::{TileError, TileResult};
use crate::store::kv::KvStore;

/// Storage key of the customer list.
pub const CUSTOMERS_KEY: &str = "tilefilter_customers";
/// Storage key of the customer new tags are attributed to.
pub const CURRENT_CUSTOMER_KEY: &str = "tilefilter_current_customer";
/// Storage key of the active filter label.
pub const ACTIVE_FILTER_KEY: &str = "tilefilter_active_filter_customer";
/// Storage key of the tagging-mode switch.
pub const TAGGING_ENABLED_KEY: &str = "tilefilter_tagging_enabled";

/// Direction for [`Preferences::cycle_filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleDirection {
    /// Towards the end of the customer list.
    Forward,
    /// Towards `ALL` and the start of the list.
    Backward,
}

/// Typed view over the preference keys of a [`KvStore`].
#[derive(Clone)]
pub struct Preferences {
    kv: Arc<dyn KvStore>,
}

impl Preferences {
    /// Wrap a store.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Known customers in the order they were added.
    pub fn customers(&self) -> TileResult<Vec<String>> {
        let got = self.kv.get(&[CUSTOMERS_KEY])?;
        let Some(Value::Array(items)) = got.get(CUSTOMERS_KEY) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<String> = Vec::with_capacity(items.len());
        for name in items.iter().filter_map(Value::as_str).map(str::trim) {
            if !name.is_empty() && !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }

    /// Add a customer (no-op when already present). Returns the updated list.
    pub fn add_customer(&self, name: &str) -> TileResult<Vec<String>> {
        let name = validate_name(name)?;
        let mut customers = self.customers()?;
        if !customers.iter().any(|c| c == name) {
            customers.push(name.to_string());
            self.put(CUSTOMERS_KEY, Value::from(customers.clone()))?;
        }
        Ok(customers)
    }

    /// Remove a customer. Clears the current customer and the active filter when they point at it.
    pub fn remove_customer(&self, name: &str) -> TileResult<Vec<String>> {
        let name = name.trim();
        let mut customers = self.customers()?;
        let before = customers.len();
        customers.retain(|c| c != name);
        if customers.len() == before {
            return Ok(customers);
        }
        let mut entries = BTreeMap::from([(CUSTOMERS_KEY.to_string(), Value::from(customers.clone()))]);
        if self.current_customer()?.as_deref() == Some(name) {
            entries.insert(CURRENT_CUSTOMER_KEY.to_string(), Value::Null);
        }
        if self.active_filter()?.customer() == Some(name) {
            entries.insert(
                ACTIVE_FILTER_KEY.to_string(),
                Value::from(FilterTarget::All.as_label()),
            );
        }
        self.kv.set(entries)?;
        Ok(customers)
    }

    /// Customer new tags are attributed to.
    pub fn current_customer(&self) -> TileResult<Option<String>> {
        let got = self.kv.get(&[CURRENT_CUSTOMER_KEY])?;
        Ok(got
            .get(CURRENT_CUSTOMER_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string))
    }

    /// Set (or clear) the current customer.
    pub fn set_current_customer(&self, name: Option<&str>) -> TileResult<()> {
        let value = match name {
            Some(n) => Value::from(validate_name(n)?),
            None => Value::Null,
        };
        self.put(CURRENT_CUSTOMER_KEY, value)
    }

    /// Persisted filter selection; [`FilterTarget::All`] when unset.
    pub fn active_filter(&self) -> TileResult<FilterTarget> {
        let got = self.kv.get(&[ACTIVE_FILTER_KEY])?;
        Ok(got
            .get(ACTIVE_FILTER_KEY)
            .and_then(Value::as_str)
            .map(FilterTarget::parse)
            .unwrap_or_default())
    }

    /// Persist the filter selection.
    pub fn set_active_filter(&self, target: &FilterTarget) -> TileResult<()> {
        self.put(ACTIVE_FILTER_KEY, Value::from(target.as_label()))
    }

    /// Whether tagging mode is switched on.
    pub fn tagging_enabled(&self) -> TileResult<bool> {
        let got = self.kv.get(&[TAGGING_ENABLED_KEY])?;
        Ok(got
            .get(TAGGING_ENABLED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Switch tagging mode.
    pub fn set_tagging_enabled(&self, enabled: bool) -> TileResult<()> {
        self.put(TAGGING_ENABLED_KEY, Value::from(enabled))
    }

    /// Step the active filter through `ALL, c1, c2, ...`, wrapping in both directions.
    ///
    /// Returns `None` (and persists nothing) when no customers exist. An active filter naming an
    /// unknown customer cycles as if it were `ALL`.
    #[tracing::instrument(skip(self))]
    pub fn cycle_filter(&self, direction: CycleDirection) -> TileResult<Option<FilterTarget>> {
        let customers = self.customers()?;
        if customers.is_empty() {
            return Ok(None);
        }
        let current = self.active_filter()?;
        let len = customers.len() + 1;
        let idx = current
            .customer()
            .and_then(|c| customers.iter().position(|x| x == c))
            .map_or(0, |i| i + 1);
        let next_idx = match direction {
            CycleDirection::Forward => (idx + 1) % len,
            CycleDirection::Backward => (idx + len - 1) % len,
        };
        let next = if next_idx == 0 {
            FilterTarget::All
        } else {
            FilterTarget::Customer(customers[next_idx - 1].clone())
        };
        self.set_active_filter(&next)?;
        tracing::info!(filter = %next, "cycled active filter");
        Ok(Some(next))
    }

    fn put(&self, key: &str, value: Value) -> TileResult<()> {
        self.kv.set(BTreeMap::from([(key.to_string(), value)]))
    }
}

fn validate_name(name: &str) -> TileResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TileError::config("customer name must be non-empty"));
    }
    if name == FilterTarget::All.as_label() {
        return Err(TileError::config(format!("'{name}' is reserved")));
    }
    Ok(name)
}

#[cfg(test)]
#[path = "../../tests/unit/store/prefs.rs"]
mod tests;
