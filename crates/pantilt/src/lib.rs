//! Pan/tilt object tracking over a framed duplex link.
//!
//! A sensor node streams camera frames to a detection service and turns the
//! replies into pan/tilt motion through a PI controller per axis.
//!
//! # Crate Structure
//!
//! - [`transport`]: duplex byte streams (TCP, Unix sockets, child stdio)
//! - [`frame`]: length-prefixed message framing and the non-blocking channel
//! - [`control`]: PI controllers, control commands, actuators
//! - [`detect`]: detection worker protocol with inference cadence
//! - [`sensor`]: the sensor node's dispatch loop

/// Re-export transport types.
pub mod transport {
    pub use pantilt_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pantilt_frame::*;
}

/// Re-export control types.
pub mod control {
    pub use pantilt_control::*;
}

/// Re-export detection types.
pub mod detect {
    pub use pantilt_detect::*;
}

/// Re-export sensor loop types.
pub mod sensor {
    pub use pantilt_sensor::*;
}
