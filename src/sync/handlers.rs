//! Incoming message dispatch.
//!
//! | kind        | action                          | reply                    |
//! |-------------|---------------------------------|--------------------------|
//! | `dosnap`    | arm a snapshot upload           | `dosnap`, OK             |
//! | `getadcval` | read last probe value           | `adcval {adcval}`, OK    |
//! | `output`    | drive `{pin, level}`            | `output`, OK/BAD         |
//! | other       | ignored                         | none                     |
//!
//! Replies go to the sender and echo its `mid`.

use log::{debug, info};
use serde_json::{Map, Value};

use super::engine::SyncHandle;
use super::intents::Intent;
use crate::app::ports::BoardPort;
use crate::error::Error;
use crate::pool::Message;
use crate::wire::{RESULT_BAD, RESULT_OK};

pub const KIND_DOSNAP: &str = "dosnap";
pub const KIND_GET_ADC: &str = "getadcval";
pub const KIND_ADC: &str = "adcval";
pub const KIND_OUTPUT: &str = "output";
pub const KIND_BUTTON: &str = "btnevent";

/// Handle one incoming message.
///
/// Messages sent by this device itself are dropped silently.
pub fn dispatch(
    msg: &Message,
    device_name: &str,
    handle: &SyncHandle,
    board: &mut impl BoardPort,
) -> Result<(), Error> {
    if msg.kind.is_empty() {
        return Err(Error::Malformed("message without kind"));
    }
    let sender = msg.source.as_deref().unwrap_or_default();
    if sender == device_name {
        return Ok(());
    }

    let mut params = Map::new();
    if let Some(mid) = msg.param("mid") {
        params.insert("mid".into(), mid.clone());
    }

    let (kind, ok) = match msg.kind.as_str() {
        KIND_DOSNAP => {
            info!("Sync: snapshot requested by '{}'", sender);
            handle.set_intent(Intent::SendSnapshot);
            (KIND_DOSNAP, true)
        }
        KIND_GET_ADC => {
            params.insert(KIND_ADC.into(), handle.sensor_millivolts().into());
            (KIND_ADC, true)
        }
        KIND_OUTPUT => {
            let pin = msg.param("pin").and_then(Value::as_u64);
            let level = msg.param("level").and_then(Value::as_u64);
            let ok = match (pin, level) {
                (Some(pin), Some(level)) => u8::try_from(pin)
                    .is_ok_and(|pin| board.set_output(pin, level != 0)),
                _ => false,
            };
            (KIND_OUTPUT, ok)
        }
        other => {
            debug!("Sync: no handler for '{}'", other);
            return Ok(());
        }
    };

    let result = if ok { RESULT_OK } else { RESULT_BAD };
    params.insert("result".into(), result.into());
    handle.push_outgoing(
        Message::new(kind)
            .with_target(sender)
            .with_params(Value::Object(params)),
    );
    Ok(())
}
