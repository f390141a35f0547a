//! TLS transport over TCP

use super::{Connector, Transport};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use native_tls::{Certificate, TlsConnector, TlsStream};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Connector for the configured server endpoint.
///
/// The server certificate chain is validated against the trust anchor from
/// the configuration file. Hostname verification is disabled: the
/// lab/simulator endpoints present certificates whose names do not match
/// the addresses they are reached on.
pub struct TlsEndpoint {
    host: String,
    port: u16,
    connector: TlsConnector,
}

impl TlsEndpoint {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pem = fs::read(&config.cert.path)?;
        let anchor = Certificate::from_pem(&pem)?;
        let connector = TlsConnector::builder()
            .add_root_certificate(anchor)
            .danger_accept_invalid_hostnames(true)
            .build()?;

        log::info!("Loaded trust anchor from {}", config.cert.path);

        Ok(Self {
            host: config.tcp.host.clone(),
            port: config.tcp.port,
            connector,
        })
    }
}

impl Connector for TlsEndpoint {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))?;
        let stream = self
            .connector
            .connect(&self.host, tcp)
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;

        log::debug!("TLS session established with {}:{}", self.host, self.port);

        Ok(Box::new(TlsTransport { stream }))
    }
}

struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

impl Transport for TlsTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buffer)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.stream.get_ref().set_read_timeout(Some(timeout))?;
        Ok(())
    }
}
