//! Byte-level transport underneath a device handle.

use hidapi::HidDevice;

use crate::Result;

/// Raw report I/O with a panel.
///
/// Implemented for [`HidDevice`]; tests substitute an in-memory transport.
pub trait Transport: Send {
    /// Writes an output report. The first byte is the report ID.
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Sends a feature report. The first byte is the report ID.
    fn send_feature_report(&self, data: &[u8]) -> Result<()>;

    /// Reads an input report, waiting at most `timeout_ms`.
    ///
    /// Returns 0 when nothing arrived in time.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl Transport for HidDevice {
    fn write(&self, data: &[u8]) -> Result<usize> {
        Ok(HidDevice::write(self, data)?)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        Ok(HidDevice::send_feature_report(self, data)?)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(HidDevice::read_timeout(self, buf, timeout_ms)?)
    }
}
