//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements             | Connects to                   |
//! |------------|------------------------|-------------------------------|
//! | `ble`      | ConfigAccessPort       | Bluedroid GATT server         |
//! | `board`    | BoardPort, DelayNs     | GPIO outputs, ADC2 probe      |
//! | `camera`   | CameraPort             | OV2640 via esp32-camera       |
//! | `device`   | CameraPort, BoardPort  | camera + board composite      |
//! | `http`     | Exchange               | HTTPS client (cert bundle)    |
//! |            | StreamTransport        | chunked upload                |
//! | `log_sink` | EventSink              | Serial log output             |
//! | `nvs`      | ConfigPort             | NVS / in-memory store         |
//! |            | StoragePort            |                               |
//! | `time`     | -                      | ESP32 system timer            |
//! | `wifi`     | ConnectivityPort       | ESP-IDF WiFi STA              |

pub mod ble;
pub mod board;
pub mod camera;
pub mod device;
pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
