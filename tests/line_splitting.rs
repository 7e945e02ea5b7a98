// tests/line_splitting.rs

use proptest::prelude::*;

use runherd::exec::OutputChunk;
use runherd::stream::lines::MAX_LINE_BYTES;
use runherd::stream::{LineEvent, LineSplitter, OutputMultiplexer, RunEvent};
use runherd::types::StreamKind;

#[test]
fn lines_split_across_chunks() {
    let mut splitter = LineSplitter::new();
    assert!(splitter.push(b"hel").is_empty());
    assert_eq!(splitter.push(b"lo\nwor"), vec!["hello"]);
    assert!(splitter.has_pending());
    assert_eq!(splitter.push(b"ld\n"), vec!["world"]);
    assert_eq!(splitter.finish(), None);
}

#[test]
fn crlf_and_blank_lines() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"a\r\n\r\n\nb\r\n");
    assert_eq!(lines, vec!["a", "b"]);
}

#[test]
fn carriage_return_redraws_become_lines() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"  10%\r  50%\r 100%\n");
    assert_eq!(lines, vec!["  10%", "  50%", " 100%"]);
}

#[test]
fn unterminated_tail_is_flushed() {
    let mut splitter = LineSplitter::new();
    assert_eq!(splitter.push(b"first\nlast"), vec!["first"]);
    assert_eq!(splitter.finish().as_deref(), Some("last"));
    assert_eq!(splitter.finish(), None);
}

#[test]
fn utf8_split_across_reads_decodes() {
    let snowman = "☃".as_bytes();
    let mut splitter = LineSplitter::new();
    assert!(splitter.push(&snowman[..1]).is_empty());
    assert_eq!(splitter.push(&[&snowman[1..], b"\n".as_slice()].concat()), vec!["☃"]);

    let lines = splitter.push(b"bad \xff byte\n");
    assert_eq!(lines, vec!["bad \u{fffd} byte"]);
}

#[test]
fn overlong_lines_are_cut() {
    let mut splitter = LineSplitter::new();
    let long = vec![b'x'; MAX_LINE_BYTES + 10];
    let lines = splitter.push(&long);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].len(), MAX_LINE_BYTES);
    assert_eq!(splitter.finish().map(|s| s.len()), Some(10));
}

#[test]
fn multiplexer_numbers_lines_in_arrival_order() {
    let mut mux = OutputMultiplexer::new();
    let mut events = Vec::new();
    events.extend(mux.push(&OutputChunk::new(StreamKind::Stdout, "compiling")));
    events.extend(mux.push(&OutputChunk::new(StreamKind::Stderr, "warning: x\n")));
    events.extend(mux.push(&OutputChunk::new(StreamKind::Stdout, " done\nok\n")));
    events.extend(mux.push(&OutputChunk::new(StreamKind::Stderr, "trailing")));
    events.extend(mux.finish());

    let expected = [
        (1, StreamKind::Stderr, "warning: x"),
        (2, StreamKind::Stdout, "compiling done"),
        (3, StreamKind::Stdout, "ok"),
        (4, StreamKind::Stderr, "trailing"),
    ]
    .map(|(seq, stream, text)| {
        RunEvent::Line(LineEvent {
            seq,
            stream,
            text: text.to_string(),
        })
    });
    assert_eq!(events, expected.to_vec());
    assert_eq!(mux.cursor(), 4);
}

proptest! {
    #[test]
    fn chunking_does_not_change_lines(
        text in "[a-z \\n\\r]{0,200}",
        cuts in proptest::collection::vec(0usize..200, 0..10),
    ) {
        let bytes = text.as_bytes();

        let mut whole = LineSplitter::new();
        let mut expected = whole.push(bytes);
        expected.extend(whole.finish());

        let mut points: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
        points.sort_unstable();
        let mut pieces = LineSplitter::new();
        let mut actual = Vec::new();
        let mut start = 0;
        for point in points.into_iter().chain(std::iter::once(bytes.len())) {
            actual.extend(pieces.push(&bytes[start..point]));
            start = point;
        }
        actual.extend(pieces.finish());

        prop_assert_eq!(&actual, &expected);
        for line in &actual {
            prop_assert!(!line.is_empty());
            prop_assert!(!line.contains('\r') && !line.contains('\n'));
        }
    }
}
