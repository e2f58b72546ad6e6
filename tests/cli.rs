//! CLI integration tests, driving the built binary.

use std::net::Ipv4Addr;
use std::path::Path;
use std::process::{Command, Output};

use pcapflow_core::{PcapWriter, Timestamp};
use tempfile::tempdir;

fn pcapflow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pcapflow"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// Ethernet/IPv4/UDP frame with `payload_len` zero bytes.
fn udp_frame(src: Ipv4Addr, sport: u16, payload_len: usize) -> Vec<u8> {
    let total_len = (28 + payload_len) as u16;
    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.extend_from_slice(&[0x45, 0]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0, 64, 17, 0, 0]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&[192, 0, 2, 1]);
    frame.extend_from_slice(&sport.to_be_bytes());
    frame.extend_from_slice(&53u16.to_be_bytes());
    frame.extend_from_slice(&((8 + payload_len) as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.resize(14 + total_len as usize, 0);
    frame
}

/// Three flows, interleaved.
fn write_capture(path: &Path) {
    let a = Ipv4Addr::new(10, 0, 0, 1);
    let b = Ipv4Addr::new(10, 0, 0, 2);
    let frames = [
        udp_frame(a, 1000, 10),
        udp_frame(b, 2000, 20),
        udp_frame(a, 1000, 30),
        udp_frame(a, 3000, 40),
        udp_frame(b, 2000, 50),
    ];
    let mut writer = PcapWriter::create(path, 1, 65535).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        let ts = Timestamp { sec: 1000, usec: i as u32 * 100 };
        writer.write_packet(ts, frame, frame.len() as u32).unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn test_extract_sort_index() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let flows = dir.path().join("flows.bin");
    let packets = dir.path().join("packets.bin");
    write_capture(&capture);

    let output = pcapflow(&[
        "extract",
        "-T",
        "-F",
        flows.to_str().unwrap(),
        "-o",
        packets.to_str().unwrap(),
        capture.to_str().unwrap(),
    ]);
    stdout(&output);
    assert_eq!(std::fs::metadata(&flows).unwrap().len(), 3 * 17);
    assert_eq!(std::fs::metadata(&packets).unwrap().len(), 5 * 22);

    let text = stdout(&pcapflow(&["index", "-f", "-c", flows.to_str().unwrap()]));
    assert_eq!(
        text,
        "0,17,10.0.0.1,192.0.2.1,1000,53\n\
         1,17,10.0.0.2,192.0.2.1,2000,53\n\
         2,17,10.0.0.1,192.0.2.1,3000,53\n"
    );

    stdout(&pcapflow(&["sort", packets.to_str().unwrap()]));

    let text = stdout(&pcapflow(&["index", "-p", "-F", "{flow}:{size}\\n", packets.to_str().unwrap()]));
    assert_eq!(text, "0:10\n0:30\n1:20\n1:50\n2:40\n");

    let list = dir.path().join("ids.txt");
    std::fs::write(&list, "2 0\n").unwrap();
    let text = stdout(&pcapflow(&[
        "index",
        "-p",
        "-L",
        list.to_str().unwrap(),
        "-r",
        "-c",
        packets.to_str().unwrap(),
    ]));
    assert_eq!(text, "0,1000.000300,40\n1,1000.000000,10\n1,1000.000200,30\n");

    let text = stdout(&pcapflow(&["index", "-p", "-T", "1", "-o", "5", "-c", packets.to_str().unwrap()]));
    assert_eq!(text, "7,1000.000300,40\n");
}

#[test]
fn test_flow_ids_follow_extraction_base() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let flows = dir.path().join("flows.bin");
    let packets = dir.path().join("packets.bin");
    write_capture(&capture);

    stdout(&pcapflow(&[
        "extract",
        "-T",
        "-i",
        "7",
        "-F",
        flows.to_str().unwrap(),
        "-o",
        packets.to_str().unwrap(),
        capture.to_str().unwrap(),
    ]));

    let text = stdout(&pcapflow(&["index", "-f", "-F", "{index} ", flows.to_str().unwrap()]));
    assert_eq!(text, "7 8 9 ");
    let text = stdout(&pcapflow(&["index", "-f", "-T", "1", "-c", flows.to_str().unwrap()]));
    assert_eq!(text, "9,17,10.0.0.1,192.0.2.1,3000,53\n");

    let list = dir.path().join("ids.txt");
    std::fs::write(&list, "8\n").unwrap();
    let text = stdout(&pcapflow(&[
        "index",
        "-f",
        "-L",
        list.to_str().unwrap(),
        "-c",
        flows.to_str().unwrap(),
    ]));
    assert_eq!(text, "8,17,10.0.0.2,192.0.2.1,2000,53\n");

    stdout(&pcapflow(&["sort", packets.to_str().unwrap()]));
    let text = stdout(&pcapflow(&[
        "index",
        "-p",
        "-L",
        list.to_str().unwrap(),
        "-F",
        "{flow}:{size} ",
        packets.to_str().unwrap(),
    ]));
    assert_eq!(text, "8:20 8:50 ");

    std::fs::write(&list, "2\n").unwrap();
    let output = pcapflow(&["index", "-f", "-L", list.to_str().unwrap(), flows.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_index_rejects_unsorted_lookup() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let flows = dir.path().join("flows.bin");
    let packets = dir.path().join("packets.bin");
    write_capture(&capture);

    stdout(&pcapflow(&[
        "extract",
        "-F",
        flows.to_str().unwrap(),
        "-o",
        packets.to_str().unwrap(),
        capture.to_str().unwrap(),
    ]));

    let output = pcapflow(&["index", "-p", "-H", "2", packets.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not sorted"), "unexpected stderr: {stderr}");
}

#[test]
fn test_reindex_and_conflicting_modes() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let flows = dir.path().join("flows.bin");
    let packets = dir.path().join("packets.bin");
    write_capture(&capture);

    stdout(&pcapflow(&[
        "extract",
        "-i",
        "40",
        "-F",
        flows.to_str().unwrap(),
        "-o",
        packets.to_str().unwrap(),
        capture.to_str().unwrap(),
    ]));
    stdout(&pcapflow(&["sort", "-p", packets.to_str().unwrap()]));
    stdout(&pcapflow(&["reindex", packets.to_str().unwrap()]));

    let text = stdout(&pcapflow(&["index", "-p", "-F", "{flow} ", packets.to_str().unwrap()]));
    assert_eq!(text, "0 0 1 1 2 ");

    let output = pcapflow(&["index", "-p", "-H", "1", "-T", "1", packets.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_splice_sizes_and_intervals() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let flows = dir.path().join("flows.bin");
    let packets = dir.path().join("packets.bin");
    write_capture(&capture);

    stdout(&pcapflow(&[
        "extract",
        "-T",
        "-F",
        flows.to_str().unwrap(),
        "-o",
        packets.to_str().unwrap(),
        capture.to_str().unwrap(),
    ]));
    stdout(&pcapflow(&["sort", packets.to_str().unwrap()]));

    let intervals = dir.path().join("intervals.txt");
    std::fs::write(&intervals, "0.5\n1.25\n").unwrap();
    stdout(&pcapflow(&["splice", "-V", packets.to_str().unwrap(), intervals.to_str().unwrap()]));

    let sizes = dir.path().join("sizes.txt");
    std::fs::write(&sizes, "1 2 3\n4 5\n").unwrap();
    stdout(&pcapflow(&["splice", "-Z", packets.to_str().unwrap(), sizes.to_str().unwrap()]));

    let text = stdout(&pcapflow(&["index", "-p", "-c", packets.to_str().unwrap()]));
    assert_eq!(
        text,
        "0,1000.000000,1\n\
         0,1000.500000,2\n\
         1,1000.000100,3\n\
         1,1001.250100,4\n\
         2,1000.000300,5\n"
    );

    std::fs::write(&sizes, "1 2 3\n").unwrap();
    let output = pcapflow(&["splice", "-Z", packets.to_str().unwrap(), sizes.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Too few splice values"), "unexpected stderr: {stderr}");
}

#[test]
fn test_split_command() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("trace.pcap");
    let out = dir.path().join("flows");
    write_capture(&capture);

    stdout(&pcapflow(&[
        "split",
        "-d",
        out.to_str().unwrap(),
        "-m",
        "1",
        capture.to_str().unwrap(),
    ]));
    assert!(out.join("10.0.0.1/192.0.2.1/17_1000_53").is_file());
    assert!(out.join("10.0.0.2/192.0.2.1/17_2000_53").is_file());
    assert!(out.join("10.0.0.1/192.0.2.1/17_3000_53").is_file());
}

#[test]
fn test_missing_input_reports_path() {
    let output = pcapflow(&["sort", "/nonexistent/packets.bin"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/packets.bin"), "unexpected stderr: {stderr}");
}
