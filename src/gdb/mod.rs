//! The GDB remote-serial-protocol debug stub (spec §4.6).
//!
//! Grounded on the teacher's `Dbg`/monitor-loop shape and the original
//! implementation's `rsp.py` framing state machine: a byte-fed receiver
//! (`RS_IDLE`/`RS_GETLINE`/`RS_CHKSUM1`/`RS_CHKSUM2`) decoupled from the
//! packet dispatcher, so the transport loop just feeds bytes and reacts to
//! the small set of events the receiver produces.

pub mod rungate;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::bus::AddressableNode;
use crate::cpu::CpuCore;
use rungate::RunGate;

#[derive(Debug, Error)]
pub enum GdbError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver states (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiverState {
    Idle,
    GetLine,
    Chksum1,
    Chksum2,
}

#[derive(Debug, PartialEq, Eq)]
enum ReceiverEvent {
    Ack,
    Nak,
    CtrlC,
    PacketOk(String),
    PacketBad,
}

/// The byte-fed packet receiver, independent of the transport.
struct PacketReceiver {
    state: ReceiverState,
    buffer: String,
    checksum_high: u8,
}

impl PacketReceiver {
    fn new() -> Self {
        Self {
            state: ReceiverState::Idle,
            buffer: String::new(),
            checksum_high: 0,
        }
    }

    fn feed_byte(&mut self, byte: u8) -> Option<ReceiverEvent> {
        match self.state {
            ReceiverState::Idle => match byte {
                b'$' => {
                    self.buffer.clear();
                    self.state = ReceiverState::GetLine;
                    None
                }
                b'+' => Some(ReceiverEvent::Ack),
                b'-' => Some(ReceiverEvent::Nak),
                0x03 => Some(ReceiverEvent::CtrlC),
                _ => None,
            },
            ReceiverState::GetLine => {
                if byte == b'#' {
                    self.state = ReceiverState::Chksum1;
                } else {
                    self.buffer.push(byte as char);
                }
                None
            }
            ReceiverState::Chksum1 => {
                self.checksum_high = hex_nibble(byte);
                self.state = ReceiverState::Chksum2;
                None
            }
            ReceiverState::Chksum2 => {
                let low = hex_nibble(byte);
                let received = (self.checksum_high << 4) | low;
                let computed = self.buffer.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
                self.state = ReceiverState::Idle;
                Some(if received == computed {
                    ReceiverEvent::PacketOk(std::mem::take(&mut self.buffer))
                } else {
                    ReceiverEvent::PacketBad
                })
            }
        }
    }
}

fn hex_nibble(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        b'A'..=b'F' => byte - b'A' + 10,
        _ => 0,
    }
}

/// Build a framed `$<payload>#<csum>` buffer (spec §4.6).
fn frame(payload: &str) -> Vec<u8> {
    let checksum = payload.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    format!("${payload}#{checksum:02x}").into_bytes()
}

/// `R0..R15` encoded as 8 lowercase hex nibbles each, little-endian byte
/// order (spec §4.6's `g`/`p` reply format).
fn encode_word_le(value: u32) -> String {
    value.to_le_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// The CPU core plus the bus it executes against, shared between the
/// execution thread and the debug-stub thread. The run-gate is the only
/// coordination primitive needed: debug-stub reads only proceed while the
/// gate is closed, so the CPU thread is guaranteed parked (spec §5).
pub struct Machine<B: AddressableNode + Send> {
    pub cpu: Mutex<CpuCore>,
    pub bus: Mutex<B>,
    pub run_gate: Arc<RunGate>,
}

/// Handle one connected debugger over `stream` until it disconnects or a
/// `k` (kill) packet is received.
pub fn serve<B: AddressableNode + Send>(mut stream: TcpStream, machine: Arc<Machine<B>>) -> Result<(), GdbError> {
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut receiver = PacketReceiver::new();
    let mut last_sent: Option<Vec<u8>> = None;
    let mut byte = [0u8; 1];

    loop {
        if machine.run_gate.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        match stream.read(&mut byte) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                if let Some(event) = receiver.feed_byte(byte[0]) {
                    match event {
                        ReceiverEvent::Ack => {}
                        ReceiverEvent::Nak => {
                            if let Some(buf) = &last_sent {
                                stream.write_all(buf)?;
                            }
                        }
                        ReceiverEvent::CtrlC => {
                            stream.write_all(&frame("S05"))?;
                        }
                        ReceiverEvent::PacketOk(body) => {
                            stream.write_all(b"+")?;
                            let reply = dispatch(&body, &machine);
                            let framed = frame(&reply);
                            stream.write_all(&framed)?;
                            last_sent = Some(framed);
                            if body == "k" {
                                return Ok(());
                            }
                        }
                        ReceiverEvent::PacketBad => {
                            stream.write_all(b"-")?;
                        }
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                if machine.run_gate.breakpoint_hit.load(Ordering::SeqCst) {
                    stream.write_all(&frame("S05"))?;
                    machine.run_gate.clear_halt();
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Decode one packet body into its unframed reply payload (spec §4.6).
fn dispatch<B: AddressableNode + Send>(body: &str, machine: &Machine<B>) -> String {
    if body == "?" {
        machine.run_gate.clear_breakpoints();
        return "T05thread:01;".to_string();
    }
    if let Some(rest) = body.strip_prefix('H') {
        let id_str = &rest[1.min(rest.len())..];
        return match id_str.parse::<i64>() {
            Ok(-1) | Ok(0) => "OK".to_string(),
            _ => String::new(),
        };
    }
    if body == "qC" {
        return "QC1".to_string();
    }
    if body == "g" {
        let cpu = machine.cpu.lock().unwrap();
        return (0u8..16).map(|r| encode_word_le(cpu.register_read(r))).collect();
    }
    if let Some(rest) = body.strip_prefix('p') {
        return match u8::from_str_radix(rest, 16) {
            Ok(reg) if reg < 16 => encode_word_le(machine.cpu.lock().unwrap().register_read(reg)),
            _ => "00000000".to_string(),
        };
    }
    if let Some(rest) = body.strip_prefix('m') {
        return dispatch_mem_read(rest, machine);
    }
    if let Some(rest) = body.strip_prefix('Z') {
        return dispatch_breakpoint(rest, machine, true);
    }
    if let Some(rest) = body.strip_prefix('z') {
        return dispatch_breakpoint(rest, machine, false);
    }
    if body == "vCont?" {
        return "vCont;c;C;s;S".to_string();
    }
    if body == "vCont;c" {
        machine.run_gate.stepping.store(false, Ordering::SeqCst);
        machine.run_gate.open_gate();
        return String::new();
    }
    if body == "vCont;s" {
        machine.run_gate.stepping.store(true, Ordering::SeqCst);
        machine.run_gate.open_gate();
        return String::new();
    }
    if body == "k" {
        machine.run_gate.stopped.store(true, Ordering::SeqCst);
        machine.run_gate.open_gate();
        return String::new();
    }
    String::new()
}

fn dispatch_mem_read<B: AddressableNode + Send>(rest: &str, machine: &Machine<B>) -> String {
    let Some((addr_str, len_str)) = rest.split_once(',') else {
        return "E14".to_string();
    };
    let (Ok(addr), Ok(len)) = (u32::from_str_radix(addr_str, 16), usize::from_str_radix(len_str, 16)) else {
        return "E14".to_string();
    };

    let mut cpu = machine.cpu.lock().unwrap();
    let mut bus = machine.bus.lock().unwrap();
    let mut out = String::with_capacity(len * 2);
    for i in 0..len as u32 {
        let byte_addr = addr.wrapping_add(i);
        let word_addr = byte_addr & !0x3;
        let offset = (byte_addr & 0x3) as usize;
        match cpu.mmu_read(&mut *bus, word_addr, false) {
            Ok(word) => out.push_str(&format!("{:02x}", word.to_le_bytes()[offset])),
            Err(_) => return "E14".to_string(),
        }
    }
    out
}

fn dispatch_breakpoint<B: AddressableNode + Send>(rest: &str, machine: &Machine<B>, insert: bool) -> String {
    let mut parts = rest.splitn(3, ',');
    let kind = parts.next();
    let addr_str = parts.next();
    if !matches!(kind, Some("0") | Some("1")) {
        return String::new();
    }
    let Some(addr_str) = addr_str else {
        return "E22".to_string();
    };
    match u32::from_str_radix(addr_str, 16) {
        Ok(addr) => {
            if insert {
                machine.run_gate.insert_breakpoint(addr);
            } else {
                machine.run_gate.remove_breakpoint(addr);
            }
            "OK".to_string()
        }
        Err(_) => "E22".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ram;
    use crate::cpu::CpuCore;

    fn test_machine() -> Arc<Machine<Ram>> {
        let (cpu, _pending) = CpuCore::new();
        Arc::new(Machine {
            cpu: Mutex::new(cpu),
            bus: Mutex::new(Ram::new("ram", 16)),
            run_gate: Arc::new(RunGate::new()),
        })
    }

    #[test]
    fn framing_matches_the_sum_mod_256_checksum() {
        let framed = frame("?");
        assert_eq!(framed, b"$?#3f");
    }

    #[test]
    fn empty_reply_frames_as_dollar_hash_00() {
        assert_eq!(frame(""), b"$#00");
    }

    #[test]
    fn question_mark_replies_with_the_stop_reason() {
        let machine = test_machine();
        assert_eq!(dispatch("?", &machine), "T05thread:01;");
    }

    #[test]
    fn g_dumps_all_sixteen_registers_little_endian() {
        let machine = test_machine();
        machine.cpu.lock().unwrap().register_write(0, 0x1234_5678);
        let reply = dispatch("g", &machine);
        assert_eq!(reply.len(), 128);
        assert_eq!(&reply[0..8], "78563412");
    }

    #[test]
    fn memory_read_returns_little_endian_bytes_of_the_mapped_word() {
        let machine = test_machine();
        machine.bus.lock().unwrap().write_default(0x8, 0x1234_5678).unwrap();
        assert_eq!(dispatch("m8,4", &machine), "78563412");
    }

    #[test]
    fn z0_inserts_a_breakpoint_matched_by_the_run_gate() {
        let machine = test_machine();
        assert_eq!(dispatch("Z0,4,4", &machine), "OK");
        assert!(machine.run_gate.matches(4));
        assert_eq!(dispatch("z0,4,4", &machine), "OK");
        assert!(!machine.run_gate.matches(4));
    }

    #[test]
    fn receiver_validates_checksum_before_emitting_a_packet() {
        let mut receiver = PacketReceiver::new();
        let mut last = None;
        for &b in b"$?#3f" {
            last = receiver.feed_byte(b);
        }
        assert_eq!(last, Some(ReceiverEvent::PacketOk("?".to_string())));
    }

    #[test]
    fn receiver_rejects_a_bad_checksum() {
        let mut receiver = PacketReceiver::new();
        let mut last = None;
        for &b in b"$?#00" {
            last = receiver.feed_byte(b);
        }
        assert_eq!(last, Some(ReceiverEvent::PacketBad));
    }
}
