//! Blocking Client
//!
//! One request at a time over a single connection. Used by the CLI and the
//! integration tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{ElevatorError, Result};
use crate::protocol::{
    decode_response, decode_values, encode_request, read_frame, write_frame, Request, Response,
    Status,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect with the default timeout
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ElevatorError::Config("address resolved to nothing".to_string()))?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    /// Send one request and wait for its response
    pub fn request(&mut self, request: &Request) -> Result<Response> {
        if request.db.len() > u16::MAX as usize {
            return Err(ElevatorError::Protocol("database name too long".to_string()));
        }
        if request.command.is_empty() || request.command.len() > u8::MAX as usize {
            return Err(ElevatorError::Protocol(format!(
                "command must be 1-{} bytes",
                u8::MAX
            )));
        }

        write_frame(&mut self.writer, &encode_request(request))?;
        let frame = read_frame(&mut self.reader)?;
        decode_response(&frame)
    }

    /// Send an already encoded request body
    pub fn request_raw(&mut self, body: &[u8]) -> Result<Response> {
        write_frame(&mut self.writer, body)?;
        let frame = read_frame(&mut self.reader)?;
        decode_response(&frame)
    }

    // =========================================================================
    // Convenience helpers
    // =========================================================================

    /// Run `command` against database `db`
    pub fn call(&mut self, db: &str, command: &str, args: &[&[u8]]) -> Result<Response> {
        let args = args.iter().map(|a| a.to_vec()).collect();
        self.request(&Request::new(db, command, args))
    }

    /// Run a global command
    pub fn call_global(&mut self, command: &str, args: &[&[u8]]) -> Result<Response> {
        let args = args.iter().map(|a| a.to_vec()).collect();
        self.request(&Request::global(command, args))
    }

    /// `Ok(None)` for a missing key; `DatabaseNotFound` for a missing database
    pub fn get(&mut self, db: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let response = self.call(db, "GET", &[key])?;
        match (response.status, response.payload.is_some()) {
            (Status::Ok, _) => Ok(Some(response.payload.unwrap_or_default())),
            // Key misses carry no payload, route misses carry an explanation
            (Status::NotFound, false) => Ok(None),
            (Status::NotFound, true) => Err(ElevatorError::DatabaseNotFound(db.to_string())),
            _ => Err(ElevatorError::Storage(response.text())),
        }
    }

    pub fn put(&mut self, db: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let response = self.call(db, "PUT", &[key, value])?;
        expect_ok(response).map(|_| ())
    }

    pub fn create_database(&mut self, name: &str) -> Result<()> {
        let response = self.call_global("DBCREATE", &[name.as_bytes()])?;
        expect_ok(response).map(|_| ())
    }

    /// Names of every registered database
    pub fn list_databases(&mut self) -> Result<Vec<String>> {
        let response = expect_ok(self.call_global("DBLIST", &[])?)?;
        let items = decode_values(response.payload.as_deref().unwrap_or_default())?;
        Ok(items
            .into_iter()
            .map(|n| String::from_utf8_lossy(&n).into_owned())
            .collect())
    }

    pub fn ping(&mut self) -> Result<()> {
        expect_ok(self.call_global("PING", &[])?).map(|_| ())
    }
}

fn expect_ok(response: Response) -> Result<Response> {
    if response.is_ok() {
        Ok(response)
    } else {
        Err(ElevatorError::Storage(format!(
            "{:?}: {}",
            response.status,
            response.text()
        )))
    }
}
