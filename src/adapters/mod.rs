//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements  | Connects to                         |
//! |-------------|-------------|-------------------------------------|
//! | `simulated` | RoasterPort | In-process thermal model            |
//! | `serial`    | RoasterPort | Vendor serial protocol over a tty   |
//! | `stub`      | RoasterPort | Nothing (fixed values)              |
//! | `time`      | Clock       | Host wall clock / manual test clock |

pub mod serial;
pub mod simulated;
pub mod stub;
pub mod time;

use log::info;

use crate::app::ports::RoasterPort;
use crate::config::HardwareConfig;
use crate::error::Result;

use self::serial::SerialRoaster;
use self::simulated::SimulatedRoaster;
use self::stub::StubRoaster;

/// Build the roaster backend selected by `config`.
///
/// The returned roaster is not yet connected.
pub fn build_roaster(config: &HardwareConfig) -> Result<Box<dyn RoasterPort>> {
    config.validate()?;
    let roaster: Box<dyn RoasterPort> = match config {
        HardwareConfig::Simulated(c) => Box::new(SimulatedRoaster::new(c.clone())),
        HardwareConfig::Serial(c) => Box::new(SerialRoaster::open(c.clone())),
        HardwareConfig::Stub(c) => Box::new(StubRoaster::new(c.clone())),
    };
    info!("hardware backend: {}", roaster.info().hardware_id);
    Ok(roaster)
}
