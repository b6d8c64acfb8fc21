//! End-to-end tests: mainline station and interrupt-side waveform together,
//! with the track signal decoded back into packets.

use dccwave::config::StationConfig;
use dccwave::mock::{DecodedPacket, MockMotorDriver, RecordingSignal, decode_bits, decode_packets};
use dccwave::{AckResult, CommandStation, PowerMode, StationShared, Waveform};

type TestWaveform<'a> = Waveform<'a, RecordingSignal, RecordingSignal>;

fn setup(shared: &StationShared) -> (TestWaveform<'_>, CommandStation<'_, MockMotorDriver>) {
    let waveform = Waveform::new(
        shared,
        RecordingSignal::default(),
        Some(RecordingSignal::default()),
    );
    let station = CommandStation::new(
        shared,
        MockMotorDriver::new(),
        Some(MockMotorDriver::new()),
        StationConfig::default(),
    );
    (waveform, station)
}

fn run(waveform: &mut TestWaveform<'_>, ticks: usize) {
    for _ in 0..ticks {
        waveform.tick();
    }
}

fn main_packets(waveform: &TestWaveform<'_>) -> Vec<DecodedPacket> {
    let bits = decode_bits(&waveform.main_signal().levels).expect("asymmetric main signal");
    decode_packets(&bits, 10)
}

fn prog_packets(waveform: &TestWaveform<'_>) -> Vec<DecodedPacket> {
    let levels = &waveform.prog_signal().unwrap().levels;
    let bits = decode_bits(levels).expect("asymmetric prog signal");
    decode_packets(&bits, 10)
}

// ============================================================================
// Packet stream
// ============================================================================

#[test]
fn idle_stream_when_nothing_scheduled() {
    let shared = StationShared::new();
    let (mut waveform, _station) = setup(&shared);
    run(&mut waveform, 5_000);

    let packets = main_packets(&waveform);
    assert!(packets.len() > 40);
    for packet in packets {
        assert_eq!(packet.bytes, [0xFF, 0x00, 0xFF]);
        assert_eq!(packet.preamble, 16);
    }
    assert!(shared.main().sent_resets_since_packet() > 40);
}

#[test]
fn prog_track_uses_long_preamble_and_reset_filler() {
    let shared = StationShared::new();
    let (mut waveform, station) = setup(&shared);
    run(&mut waveform, 500);
    station
        .prog()
        .unwrap()
        .schedule_packet(&[0x78, 0x00, 0x03], 0)
        .unwrap();
    run(&mut waveform, 3_000);

    let packets = prog_packets(&waveform);
    assert!(packets.iter().all(|p| p.preamble == 22));
    assert_eq!(packets[0].bytes, [0x00, 0x00, 0x00]);
    let verify = packets
        .iter()
        .position(|p| p.bytes == [0x78, 0x00, 0x03, 0x7B])
        .expect("programming packet never sent");
    assert_eq!(packets[verify + 1].bytes, [0x00, 0x00, 0x00]);

    assert!(main_packets(&waveform).iter().all(|p| p.preamble == 16));
}

#[test]
fn scheduled_packet_waits_for_repeats_of_current_one() {
    let shared = StationShared::new();
    let (mut waveform, station) = setup(&shared);
    let a = [0x03, 0x3F, 0x10];
    let b = [0x03, 0x22];

    station.main().schedule_packet(&a, 2).unwrap();
    while station.main().is_packet_pending() {
        waveform.tick();
    }
    // A has just been picked up; B is queued behind its repeats.
    station.main().schedule_packet(&b, 0).unwrap();
    run(&mut waveform, 3_000);

    let packets: Vec<Vec<u8>> = main_packets(&waveform).into_iter().map(|p| p.bytes).collect();
    let a_sent = vec![0x03, 0x3F, 0x10, 0x2C];
    let b_sent = vec![0x03, 0x22, 0x21];
    let first_a = packets.iter().position(|p| *p == a_sent).unwrap();
    assert!(packets[..first_a].iter().all(|p| p == &[0xFF, 0x00, 0xFF]));
    assert_eq!(packets[first_a..first_a + 3], [a_sent.clone(), a_sent.clone(), a_sent]);
    assert_eq!(packets[first_a + 3], b_sent);
    assert_eq!(packets[first_a + 4], [0xFF, 0x00, 0xFF]);
}

#[test]
fn last_scheduled_packet_wins() {
    let shared = StationShared::new();
    let (mut waveform, station) = setup(&shared);
    station.main().schedule_packet(&[0x01, 0x01], 0).unwrap();
    station.main().schedule_packet(&[0x02, 0x02], 0).unwrap();
    run(&mut waveform, 2_000);

    let packets = main_packets(&waveform);
    assert!(packets.iter().all(|p| p.bytes != [0x01, 0x01, 0x00]));
    assert_eq!(
        packets
            .iter()
            .filter(|p| p.bytes == [0x02, 0x02, 0x00])
            .count(),
        1
    );
}

#[test]
fn blocking_schedule_after_pickup() {
    let shared = StationShared::new();
    let (mut waveform, station) = setup(&shared);
    station.main().schedule_packet(&[0x05, 0x05], 0).unwrap();
    run(&mut waveform, 400);
    // The first packet has been picked up, so this returns immediately.
    station
        .main()
        .schedule_packet_blocking(&[0x06, 0x06], 0)
        .unwrap();
    run(&mut waveform, 1_000);

    let bytes: Vec<Vec<u8>> = main_packets(&waveform).into_iter().map(|p| p.bytes).collect();
    let first = bytes.iter().position(|p| p == &[0x05, 0x05, 0x00]).unwrap();
    let second = bytes.iter().position(|p| p == &[0x06, 0x06, 0x00]).unwrap();
    assert!(first < second);
}

#[test]
fn prog_track_follows_main_when_joined() {
    let shared = StationShared::new();
    let (mut waveform, mut station) = setup(&shared);
    station.set_prog_sync_main(true);
    station.main().schedule_packet(&[0x03, 0x3F, 0x10], 1).unwrap();
    run(&mut waveform, 1_500);
    assert_eq!(
        waveform.main_signal().levels,
        waveform.prog_signal().unwrap().levels
    );
}

// ============================================================================
// Power and acknowledgement
// ============================================================================

#[test]
fn programming_sequence_with_ack() {
    let shared = StationShared::new();
    let (mut waveform, mut station) = setup(&shared);
    let prog = station.prog_mut().unwrap();
    prog.set_power_mode(PowerMode::On);
    prog.set_auto_power_off(true);
    prog.driver_mut().current = 10;
    prog.set_ack_baseline().unwrap();
    prog.schedule_packet(&[0x78, 0x00, 0x03], 4).unwrap();
    prog.set_ack_pending(0).unwrap();
    run(&mut waveform, 100);

    let mut now_us = 0;
    let mut result = AckResult::Waiting;
    while result == AckResult::Waiting {
        now_us += 500;
        // Decoder draws an extra ~150 mA from 3 ms to 9 ms.
        let current = if (3_000..9_000).contains(&now_us) { 60 } else { 10 };
        let prog = station.prog_mut().unwrap();
        prog.driver_mut().current = current;
        result = prog.get_ack(now_us).unwrap();
        let mut out = String::new();
        station.poll(true, now_us / 1000, &mut out).unwrap();
        assert!(out.is_empty(), "unexpected power event: {out}");
    }
    assert_eq!(result, AckResult::Ack);
    assert_eq!(now_us, 9_000);

    let prog = station.prog_mut().unwrap();
    assert_eq!(prog.ack_detector().unwrap().pulse_duration_us(), 6_000);
    prog.do_auto_power_off();
    assert_eq!(prog.power_mode(), PowerMode::Off);
}

#[test]
fn programming_sequence_without_ack() {
    let shared = StationShared::new();
    let (_waveform, mut station) = setup(&shared);
    let prog = station.prog_mut().unwrap();
    prog.set_power_mode(PowerMode::On);
    prog.set_ack_baseline().unwrap();
    prog.set_ack_pending(1_000).unwrap();

    let mut now_us = 1_000;
    let result = loop {
        now_us += 1_000;
        match prog.get_ack(now_us).unwrap() {
            AckResult::Waiting => continue,
            done => break done,
        }
    };
    assert_eq!(result, AckResult::Nack);
    assert_eq!(now_us, 151_000);
}

#[test]
fn short_during_abandoned_ack_still_trips() {
    let shared = StationShared::new();
    let (_waveform, mut station) = setup(&shared);
    let prog = station.prog_mut().unwrap();
    prog.set_power_mode(PowerMode::On);
    prog.set_ack_baseline().unwrap();
    prog.set_ack_pending(0).unwrap();
    prog.driver_mut().current = 5000;
    assert_eq!(prog.get_ack(1000).unwrap(), AckResult::Waiting);

    // The programming sequence was abandoned: no more get_ack calls.
    let mut out = String::new();
    station.poll(false, 0, &mut out).unwrap();
    assert!(out.is_empty());
    station.poll(false, 100, &mut out).unwrap();
    assert!(out.starts_with("*** PROG TRACK OVERLOAD"), "{out}");
    assert_eq!(station.prog().unwrap().power_mode(), PowerMode::Overload);
}

#[test]
fn main_track_overload_retry_cycle() {
    let shared = StationShared::new();
    let (_waveform, mut station) = setup(&shared);
    station.main_mut().set_power_mode(PowerMode::On);
    station.main_mut().driver_mut().current = 1_000;

    let mut out = String::new();
    station.poll(false, 0, &mut out).unwrap();
    assert!(out.starts_with("*** TRACK 0 OVERLOAD"));
    assert!(!station.main().driver().power);

    out.clear();
    station.poll(false, 20, &mut out).unwrap();
    assert_eq!(out, "TRACK 0 POWER ON after OVERLOAD\n");
    assert!(station.main().driver().power);

    out.clear();
    station.poll(false, 120, &mut out).unwrap();
    assert!(out.contains("offtime=40mS"));
}
