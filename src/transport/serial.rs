use std::io;

use async_trait::async_trait;
use serialport::{SerialPortType, UsbPortInfo};
use tokio_serial::SerialPortBuilderExt;

use crate::{
    device::SerialSettings,
    transport::{PortInfo, Session, Transport, TransportError},
};

/// The real transport, backed by tokio-serial.
#[derive(Debug, Default)]
pub struct SerialTransport;

#[async_trait]
impl Transport for SerialTransport {
    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        Ok(ports
            .into_iter()
            .map(|info| PortInfo {
                path: info.port_name,
                hardware_descriptor: describe(&info.port_type),
            })
            .collect())
    }

    async fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> Result<Session, TransportError> {
        let stream = tokio_serial::new(path, settings.baud)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .open_native_async()
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let (read, write) = tokio::io::split(stream);

        Ok(Session::new(Box::new(read), Box::new(write)))
    }
}

/// Render the port's hardware information into the descriptor string the
/// admission pipeline greps for `VID:PID=` in.
///
/// This mirrors the sysfs-style strings other serial stacks expose and
/// stands in until matching moves to the structured USB info.
fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(UsbPortInfo {
            vid,
            pid,
            serial_number,
            ..
        }) => format!(
            "USB VID:PID={vid:04x}:{pid:04x} SNR={}",
            serial_number.as_deref().unwrap_or("None")
        ),
        SerialPortType::PciPort => "PCI n/a".into(),
        SerialPortType::BluetoothPort => "Bluetooth n/a".into(),
        SerialPortType::Unknown => "n/a".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_ports_carry_the_hardware_id_key() {
        let descriptor = describe(&SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x1a86,
            pid: 0x7523,
            serial_number: Some("85438".into()),
            manufacturer: None,
            product: None,
        }));

        assert_eq!(descriptor, "USB VID:PID=1a86:7523 SNR=85438");
    }

    #[test]
    fn non_usb_ports_have_no_hardware_id() {
        assert!(!describe(&SerialPortType::Unknown).contains("VID:PID="));
    }
}
