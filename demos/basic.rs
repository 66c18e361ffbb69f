//! Walks through block reuse, merging and splitting on a heap backed by the
//! process address space. Run with `RUST_LOG=trace` to see every step.

use brkalloc::{Addr, Heap, HeapConfig};

fn log_alloc(heap: &Heap, label: &str, size: usize, addr: Option<Addr>) {
    let region_size = heap.region_size();
    println!("[{label}] asked {size} bytes, got {addr:?}, region is {region_size} bytes");
}

fn print_blocks(heap: &Heap) {
    for block in heap.blocks() {
        let (addr, size, open) = (block.addr, block.payload_size, block.is_open);
        println!("    {addr:?} {size:>6} bytes, open: {open}");
    }
}

fn main() {
    env_logger::init();

    let mut heap = Heap::with_config(HeapConfig::default().with_reserve(16 << 20));

    let a = heap.allocate(64);
    log_alloc(&heap, "a", 64, a);
    let b = heap.allocate(64);
    log_alloc(&heap, "b", 64, b);
    let c = heap.allocate(64);
    log_alloc(&heap, "c", 64, c);

    // Reuse example
    heap.deallocate(b);
    let d = heap.allocate(64);
    log_alloc(&heap, "d", 64, d);
    println!("d reused b: {}", d == b);

    // Merge example
    heap.deallocate(a);
    heap.deallocate(d);
    println!("\nAfter releasing a and d:");
    print_blocks(&heap);

    // Split example
    let e = heap.allocate(16);
    log_alloc(&heap, "e", 16, e);
    println!("\nAfter carving e out of the merged block:");
    print_blocks(&heap);

    // Resize example
    if let Some(e) = e {
        heap.payload_mut(e)[..5].copy_from_slice(b"hello");
    }
    let e = heap.resize(e, 4096);
    log_alloc(&heap, "e resized", 4096, e);
    if let Some(e) = e {
        let kept = String::from_utf8_lossy(&heap.payload(e)[..5]);
        println!("contents kept: {kept}");
    }

    heap.deallocate(c);
    heap.deallocate(e);
    println!("\nAfter releasing everything:");
    print_blocks(&heap);
    println!("{:#?}", heap.stats());
}
