//! Persisted user preference: the render delay

use crate::readiness::DelayTime;
use crate::store::KeyValueStore;
use crate::Result;
use log::{debug, warn};

/// Store key holding the delay in milliseconds
pub const DELAY_STORAGE_KEY: &str = "bookwalker-delay-time";

/// Read the saved delay, falling back to the default when missing or invalid
pub fn load_delay(store: &mut dyn KeyValueStore) -> DelayTime {
    let raw = match store.get(DELAY_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return DelayTime::default(),
        Err(e) => {
            warn!("Could not read saved delay: {}", e);
            return DelayTime::default();
        }
    };

    match crate::position::parse_leading_int(&raw)
        .and_then(|ms| u64::try_from(ms).ok())
        .map(DelayTime::from_millis)
    {
        Some(Ok(delay)) => {
            debug!("Loaded saved delay of {} ms", delay.as_millis());
            delay
        }
        _ => {
            warn!("Ignoring saved delay {:?}; using default", raw);
            DelayTime::default()
        }
    }
}

/// Persist the delay as a millisecond string
pub fn save_delay(store: &mut dyn KeyValueStore, delay: DelayTime) -> Result<()> {
    store.set(DELAY_STORAGE_KEY, &delay.as_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn missing_preference_uses_default() {
        let mut store = MemoryStore::new();
        assert_eq!(load_delay(&mut store), DelayTime::default());
    }

    #[test]
    fn saved_preference_round_trips() {
        let mut store = MemoryStore::new();
        save_delay(&mut store, DelayTime::from_seconds(5.0).unwrap()).unwrap();
        assert_eq!(store.get(DELAY_STORAGE_KEY).unwrap().as_deref(), Some("5000"));
        assert_eq!(load_delay(&mut store).as_millis(), 5000);
    }

    #[test]
    fn invalid_preference_falls_back() {
        let mut store = MemoryStore::new();
        for raw in ["soon", "100", "-3000", "999999"] {
            store.set(DELAY_STORAGE_KEY, raw).unwrap();
            assert_eq!(load_delay(&mut store), DelayTime::default(), "{}", raw);
        }
    }
}
