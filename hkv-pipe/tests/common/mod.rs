//! Fake RESP2 server for integration tests.
//!
//! Serves every accepted connection on its own thread and answers commands in
//! arrival order, so pipelined batches work the way they do against Redis.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use hkv_pipe::{KVPipe, PipeConfig};

#[derive(Default)]
struct ServerState {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    password: Option<String>,
    accepted: AtomicUsize,
    commands: AtomicUsize,
    streams: Mutex<Vec<TcpStream>>,
}

pub struct FakeServer {
    pub addr: String,
    state: Arc<ServerState>,
}

impl FakeServer {
    pub fn start() -> Self {
        Self::spawn(ServerState::default())
    }

    pub fn with_password(password: &str) -> Self {
        Self::spawn(ServerState {
            password: Some(password.to_string()),
            ..ServerState::default()
        })
    }

    fn spawn(state: ServerState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let state = Arc::new(state);

        let accept_state = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                if let Ok(clone) = stream.try_clone() {
                    accept_state.streams.lock().unwrap().push(clone);
                }
                let conn_state = accept_state.clone();
                thread::spawn(move || serve(stream, conn_state));
            }
        });

        FakeServer { addr, state }
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Commands served so far, across all connections.
    pub fn commands(&self) -> usize {
        self.state.commands.load(Ordering::SeqCst)
    }

    /// Closes every open connection from the server side.
    pub fn kill_connections(&self) {
        for stream in self.state.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.state.data.lock().unwrap().get(key.as_bytes()).cloned()
    }

    pub fn config(&self) -> PipeConfig {
        PipeConfig {
            addr: self.addr.clone(),
            max_idle: 2,
            max_active: 2,
            idle_interval: Duration::from_millis(1),
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
            connect_timeout: Some(Duration::from_secs(1)),
            ..PipeConfig::default()
        }
    }

    pub fn pipe(&self) -> KVPipe {
        KVPipe::with_config(self.config()).expect("pipe")
    }
}

fn serve(stream: TcpStream, state: Arc<ServerState>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let mut writer = BufWriter::new(stream);
    let mut authed = state.password.is_none();

    loop {
        let args = match read_command(&mut reader) {
            Ok(args) => args,
            Err(_) => return,
        };
        state.commands.fetch_add(1, Ordering::SeqCst);
        let reply = dispatch(&args, &state, &mut authed);
        if writer.write_all(&reply).is_err() {
            return;
        }
        // Flush once the client's pipelined input has been consumed.
        if reader.buffer().is_empty() && writer.flush().is_err() {
            return;
        }
    }
}

fn dispatch(args: &[Vec<u8>], state: &ServerState, authed: &mut bool) -> Vec<u8> {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    if name == "AUTH" {
        return match (&state.password, args.get(1)) {
            (Some(expected), Some(given)) if expected.as_bytes() == given.as_slice() => {
                *authed = true;
                simple("OK")
            }
            _ => error("ERR invalid password"),
        };
    }
    if !*authed {
        return error("NOAUTH Authentication required.");
    }

    let mut data = state.data.lock().unwrap();
    match (name.as_str(), args.len()) {
        ("PING", 1) => simple("PONG"),
        ("SELECT", 2) => simple("OK"),
        ("INFO", _) => bulk(b"role:master\r\nengine:fake\r\n"),
        ("SET", 3) => {
            data.insert(args[1].clone(), args[2].clone());
            simple("OK")
        }
        ("GET", 2) => match data.get(&args[1]) {
            Some(value) => bulk(value),
            None => b"$-1\r\n".to_vec(),
        },
        ("DEL", n) if n >= 2 => {
            let removed = args[1..].iter().filter(|key| data.remove(*key).is_some()).count();
            integer(removed as i64)
        }
        ("MGET", n) if n >= 2 => {
            let mut out = format!("*{}\r\n", n - 1).into_bytes();
            for key in &args[1..] {
                match data.get(key) {
                    Some(value) => out.extend_from_slice(&bulk(value)),
                    None => out.extend_from_slice(b"$-1\r\n"),
                }
            }
            out
        }
        _ => error(&format!("ERR unknown command '{}'", name)),
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    if args.is_empty() {
        return Err(invalid("empty command"));
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("digit"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

fn simple(message: &str) -> Vec<u8> {
    format!("+{}\r\n", message).into_bytes()
}

fn error(message: &str) -> Vec<u8> {
    format!("-{}\r\n", message).into_bytes()
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}
