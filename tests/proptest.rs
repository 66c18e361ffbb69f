/*
 * proptest.rs
 *
 * random sequences of allocate / release / resize against a model of what
 * every live allocation should contain.
 */

use brkalloc::{Addr, Buffer, Heap, HeapConfig};
use proptest::prelude::*;
use proptest::sample::Index;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    AllocateZeroed(usize, usize),
    Deallocate(Index),
    Resize(Index, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..512).prop_map(Op::Allocate),
        1 => (1usize..16, 1usize..32).prop_map(|(count, size)| Op::AllocateZeroed(count, size)),
        3 => any::<Index>().prop_map(Op::Deallocate),
        2 => (any::<Index>(), 0usize..1024).prop_map(|(index, size)| Op::Resize(index, size)),
    ]
}

/// A live allocation and the bytes it must still hold.
struct Live {
    addr: Addr,
    contents: Vec<u8>,
}

fn check(heap: &Heap<Buffer>, live: &[Live]) -> Result<(), TestCaseError> {
    prop_assert!(heap.validate().is_ok(), "{:?}", heap.validate());

    for allocation in live {
        let payload = heap.payload(allocation.addr);
        prop_assert!(payload.len() >= allocation.contents.len());
        prop_assert_eq!(&payload[..allocation.contents.len()], allocation.contents.as_slice());
    }

    let mut spans: Vec<_> = live
        .iter()
        .map(|allocation| {
            let start = allocation.addr.offset();
            (start, start + allocation.contents.len())
        })
        .collect();
    spans.sort_unstable();

    for pair in spans.windows(2) {
        prop_assert!(pair[0].1 <= pair[1].0, "overlapping allocations {:?}", pair);
    }

    prop_assert_eq!(heap.stats().closed_blocks, live.len());

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn random_operations_keep_the_heap_consistent(ops in prop::collection::vec(op(), 1..80)) {
        let mut heap = Heap::from_source(Buffer::new(), HeapConfig::default());
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            let tag = step as u8 | 1;

            match op {
                Op::Allocate(size) => {
                    let addr = heap.allocate(size).unwrap();
                    heap.payload_mut(addr)[..size].fill(tag);
                    live.push(Live { addr, contents: vec![tag; size] });
                }
                Op::AllocateZeroed(count, size) => {
                    let addr = heap.allocate_zeroed(count, size).unwrap();
                    live.push(Live { addr, contents: vec![0; count * size] });
                }
                Op::Deallocate(index) => {
                    if live.is_empty() {
                        heap.deallocate(None);
                    } else {
                        let allocation = live.swap_remove(index.index(live.len()));
                        heap.deallocate(Some(allocation.addr));
                    }
                }
                Op::Resize(index, size) => {
                    if live.is_empty() {
                        if let Some(addr) = heap.resize(None, size) {
                            live.push(Live { addr, contents: Vec::new() });
                        }
                    } else {
                        let position = index.index(live.len());
                        let old = live.swap_remove(position);

                        match heap.resize(Some(old.addr), size) {
                            Some(addr) => {
                                let mut contents = old.contents;
                                contents.truncate(size);
                                let kept = contents.len();
                                contents.resize(size, tag);
                                heap.payload_mut(addr)[kept..size].fill(tag);
                                live.push(Live { addr, contents });
                            }
                            None => prop_assert_eq!(size, 0),
                        }
                    }
                }
            }

            check(&heap, &live)?;
        }
    }

    #[test]
    fn releasing_everything_leaves_one_open_block(
        sizes in prop::collection::vec(1usize..256, 1..40),
        order in any::<Vec<Index>>()
    ) {
        let mut heap = Heap::from_source(Buffer::new(), HeapConfig::default());
        let mut addrs: Vec<_> = sizes.iter().map(|&size| heap.allocate(size).unwrap()).collect();
        let region_size = heap.region_size();

        for index in order {
            if addrs.is_empty() {
                break;
            }
            let addr = addrs.swap_remove(index.index(addrs.len()));
            heap.deallocate(Some(addr));
        }
        for addr in addrs {
            heap.deallocate(Some(addr));
        }

        let stats = heap.stats();
        prop_assert_eq!(stats.blocks, 1);
        prop_assert_eq!(stats.open_blocks, 1);
        prop_assert_eq!(stats.region_size, region_size);
        prop_assert!(heap.validate().is_ok());
    }

    #[test]
    fn freed_block_is_reused_for_the_same_size(
        sizes in prop::collection::vec(1usize..256, 1..10),
        pick in any::<Index>()
    ) {
        let mut heap = Heap::from_source(Buffer::new(), HeapConfig::default());
        let addrs: Vec<_> = sizes.iter().map(|&size| heap.allocate(size).unwrap()).collect();
        let position = pick.index(addrs.len());
        let region_size = heap.region_size();

        heap.deallocate(Some(addrs[position]));

        prop_assert_eq!(heap.allocate(sizes[position]), Some(addrs[position]));
        prop_assert_eq!(heap.region_size(), region_size);
    }
}
