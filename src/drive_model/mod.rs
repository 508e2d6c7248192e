//! drive_model - engine-agnostic raycast vehicle model (wheels, drivetrain, assists)

pub mod types;
pub mod kinematics;
pub mod suspension;
pub mod tire;
pub mod wheel;
pub mod drivetrain;
pub mod assist;

pub use wheel::Wheel;
pub use drivetrain::{Drivetrain, ShiftDirection};
pub use assist::AssistLayer;
