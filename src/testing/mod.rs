pub mod mocks;

pub use mocks::MockDevice;
