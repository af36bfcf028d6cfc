use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use unmute_kit::{LoopbackEngine, PlanarBuffer};

/// Counts allocations made by the current thread while counting is enabled.
struct CountingAlloc;

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn record() {
    let counting = COUNTING.try_with(Cell::get).unwrap_or(false);
    if counting {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record();
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record();
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record();
        unsafe { System.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations_during(f: impl FnOnce()) -> usize {
    ALLOCATIONS.with(|count| count.set(0));
    COUNTING.with(|counting| counting.set(true));
    f();
    COUNTING.with(|counting| counting.set(false));
    ALLOCATIONS.with(Cell::get)
}

#[test]
fn process_over_slices_never_allocates() {
    let engine = LoopbackEngine::new();
    let left_in = vec![0.3f32; 512];
    let right_in = vec![0.6f32; 512];
    let mut left_out = vec![1.0f32; 512];
    let mut right_out = vec![1.0f32; 512];

    let idle = allocations_during(|| {
        let inputs: [Option<&[f32]>; 2] = [Some(&left_in), Some(&right_in)];
        let mut outputs: [Option<&mut [f32]>; 2] = [Some(&mut left_out), Some(&mut right_out)];
        for _ in 0..16 {
            engine.process(&inputs, &mut outputs, 512);
        }
    });
    assert_eq!(idle, 0);
    assert!(left_out.iter().all(|&s| s == 0.0));

    engine.begin_test();
    let active = allocations_during(|| {
        let inputs: [Option<&[f32]>; 3] = [Some(&left_in), None, Some(&right_in)];
        let mut outputs: [Option<&mut [f32]>; 2] = [Some(&mut left_out), Some(&mut right_out)];
        for _ in 0..16 {
            engine.process(&inputs[..], &mut outputs[..], 512);
        }
    });
    assert_eq!(active, 0);
    assert_eq!(left_out, right_in);
}

#[test]
fn process_over_planar_buffers_never_allocates() {
    let engine = LoopbackEngine::new();
    let interleaved = vec![0.25f32; 256 * 2];
    let mut input = PlanarBuffer::new(2, 256);
    let mut output = PlanarBuffer::new(2, 256);
    let mut device_out = vec![0i16; 256 * 2];

    let mut render = |engine: &LoopbackEngine| {
        input.load_interleaved(&interleaved, 2);
        output.set_frames(input.frames());
        engine.process(&input, &mut output, input.frames());
        output.store_interleaved(&mut device_out, 2, |s| (s * i16::MAX as f32) as i16);
    };

    assert_eq!(allocations_during(|| render(&engine)), 0);
    engine.begin_test();
    assert_eq!(allocations_during(|| render(&engine)), 0);
    assert!(device_out.iter().all(|&s| s == (0.25 * i16::MAX as f32) as i16));
}
