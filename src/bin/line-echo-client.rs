//! Interactive client for the line echo server.
//!
//! Sends each line read from stdin and prints the server's reply. Exits on
//! stdin EOF or when the server closes the connection.

use clap::Parser;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "line-echo-client")]
#[command(version = "0.1.0")]
#[command(about = "Send stdin lines to a line echo server", long_about = None)]
struct Args {
    /// Server address (e.g., 127.0.0.1:7878)
    #[arg(default_value = "127.0.0.1:7878")]
    server: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let stream = TcpStream::connect(&args.server)?;
    debug!(server = %args.server, "Connected");

    echo_lines(stream, io::stdin().lock(), io::stdout().lock())?;
    Ok(())
}

/// Relay `input` line by line through the server, copying replies to `output`.
fn echo_lines<R, W>(stream: TcpStream, mut input: R, mut output: W) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let mut reply = Vec::new();

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        writer.write_all(&line)?;

        reply.clear();
        if !line.ends_with(b"\n") {
            // The server only echoes an unterminated line once we stop sending
            writer.shutdown(Shutdown::Write)?;
            reader.read_to_end(&mut reply)?;
            output.write_all(&reply)?;
            output.flush()?;
            break;
        }

        if reader.read_until(b'\n', &mut reply)? == 0 {
            debug!("Server closed the connection");
            break;
        }
        output.write_all(&reply)?;
        output.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Echo each newline-terminated piece back, plus any tail at end-of-stream.
    fn line_echo_peer() -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).unwrap() == 0 {
                    break;
                }
                writer.write_all(&buf).unwrap();
            }
        });
        (addr, handle)
    }

    fn connect(addr: &str) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }

    #[test]
    fn test_relays_each_line() {
        let (addr, peer) = line_echo_peer();
        let mut output = Vec::new();
        echo_lines(connect(&addr), &b"one\ntwo\n"[..], &mut output).unwrap();
        assert_eq!(output, b"one\ntwo\n");
        peer.join().unwrap();
    }

    #[test]
    fn test_unterminated_last_line_is_echoed() {
        let (addr, peer) = line_echo_peer();
        let mut output = Vec::new();
        echo_lines(connect(&addr), &b"one\ntail"[..], &mut output).unwrap();
        assert_eq!(output, b"one\ntail");
        peer.join().unwrap();
    }
}
