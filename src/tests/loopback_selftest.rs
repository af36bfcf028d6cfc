use dasp_signal::{self as signal, Signal};

use crate::{InputChannels, LoopbackEngine, OutputChannels, PlanarBuffer};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_FRAMES: usize = 256;

fn stereo_sine(frequency_hz: f64, frames: usize) -> Vec<f32> {
    let mut sine = signal::rate(SAMPLE_RATE).const_hz(frequency_hz).sine();
    let mut out = Vec::with_capacity(frames * 2);
    for _ in 0..frames {
        let sample = (sine.next() * 0.5) as f32;
        out.push(sample);
        out.push(-sample);
    }
    out
}

fn render(engine: &LoopbackEngine, input: &[f32], output: &mut PlanarBuffer) -> Vec<f32> {
    let mut planar_in = PlanarBuffer::new(2, BLOCK_FRAMES);
    let mut recorded = Vec::with_capacity(input.len());
    for block in input.chunks(BLOCK_FRAMES * 2) {
        let frames = planar_in.load_interleaved(block, 2);
        output.set_frames(frames);
        engine.process(&planar_in, output, frames);
        let mut interleaved = vec![0.0f32; frames * 2];
        output.store_interleaved(&mut interleaved, 2, |s| s);
        recorded.extend_from_slice(&interleaved);
    }
    recorded
}

#[test]
fn loopback_selftest_sine_through_engine() {
    let engine = LoopbackEngine::new();
    let input = stereo_sine(1_000.0, (SAMPLE_RATE as usize) / 10);
    let mut output = PlanarBuffer::new(2, BLOCK_FRAMES);

    assert!(engine.begin_test());
    let recorded = render(&engine, &input, &mut output);

    // Both outputs carry the highest input channel (the inverted one).
    assert_eq!(recorded.len(), input.len());
    for (frame_in, frame_out) in input.chunks_exact(2).zip(recorded.chunks_exact(2)) {
        assert_eq!(frame_out, &[frame_in[1], frame_in[1]]);
    }
}

#[test]
fn loopback_selftest_stop_silences_next_block() {
    let engine = LoopbackEngine::new();
    let input = stereo_sine(440.0, BLOCK_FRAMES * 4);
    let mut output = PlanarBuffer::new(2, BLOCK_FRAMES);

    engine.begin_test();
    let loud = render(&engine, &input, &mut output);
    assert!(loud.iter().any(|s| s.abs() > 0.1));

    assert!(!engine.begin_test());
    let quiet = render(&engine, &input, &mut output);
    assert!(quiet.iter().all(|&s| s == 0.0));
    assert_eq!(output.channel(0).map(<[f32]>::len), Some(BLOCK_FRAMES));
    assert!(output.channel_mut(2).is_none());
}
