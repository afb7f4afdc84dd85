// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Endpoint container under random destruction.

#![allow(clippy::missing_panics_doc)]

use peerbus::endpoint::{ContainerEntry, ContainerError, EndpointContainer};
use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

#[derive(Debug)]
struct Entry {
    tag: usize,
    closes: Rc<Cell<usize>>,
}

impl ContainerEntry for Entry {
    fn drop_connection(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}

fn fill(container: &mut EndpointContainer<Entry>, n: usize, closes: &Rc<Cell<usize>>) -> Vec<usize> {
    let first = container.get_full_container_size();
    (first..first + n)
        .map(|tag| {
            let closes = Rc::clone(closes);
            container
                .allocate(|| Ok::<_, Infallible>(Entry { tag, closes }))
                .expect("allocate should succeed")
        })
        .collect()
}

#[test]
fn destroy_random_half_then_compact() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let closes = Rc::new(Cell::new(0));
    let mut container = EndpointContainer::with_limits(512, 1);
    let indices = fill(&mut container, 100, &closes);

    let mut victims = indices.clone();
    rng.shuffle(&mut victims);
    victims.truncate(50);
    for &i in &victims {
        assert!(container.destroy(i));
    }
    // Destroying twice is harmless.
    assert!(!container.destroy(victims[0]));
    assert_eq!(closes.get(), 50);

    for &i in &indices {
        assert_eq!(container.is_valid(i), !victims.contains(&i), "slot {}", i);
    }
    let survivors: Vec<usize> = container.iter().map(|(_, p)| p.tag).collect();
    let mut expected: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|i| !victims.contains(i))
        .collect();
    expected.sort_unstable();
    assert_eq!(survivors, expected);
    assert_eq!(container.get_full_container_size(), 100);

    assert!(container.needs_compact());
    container.compact();
    assert_eq!(container.get_full_container_size(), 50);
    let after: Vec<usize> = container.iter().map(|(_, p)| p.tag).collect();
    assert_eq!(after, survivors);
}

#[test]
fn full_before_ceiling_and_allocate_refused() {
    let closes = Rc::new(Cell::new(0));
    let mut container = EndpointContainer::with_limits(8, 2);
    let mut n = 0;
    while !container.full() {
        fill(&mut container, 1, &closes);
        n += 1;
    }
    assert_eq!(n, 6);
    assert!(container.get_full_container_size() < 8);

    let mut called = false;
    let err = container
        .allocate(|| {
            called = true;
            Ok::<_, Infallible>(Entry {
                tag: 99,
                closes: Rc::clone(&closes),
            })
        })
        .unwrap_err();
    assert!(matches!(err, ContainerError::Full { ceiling: 8, headroom: 2 }));
    assert!(!called);
    let tags: Vec<usize> = container.iter().map(|(_, p)| p.tag).collect();
    assert_eq!(tags, (0..6).collect::<Vec<_>>());
}

#[test]
fn cursor_walk_skips_destroyed_slots() {
    let closes = Rc::new(Cell::new(0));
    let mut container = EndpointContainer::with_limits(64, 1);
    fill(&mut container, 5, &closes);
    container.destroy(1);
    container.destroy(3);

    let mut seen = Vec::new();
    let mut cursor = container.begin();
    while let Some(p) = container.at(cursor) {
        seen.push(p.tag);
        cursor = container.next(cursor);
    }
    assert_eq!(seen, vec![0, 2, 4]);
    assert_eq!(cursor, container.end());

    container.clear();
    assert!(container.is_empty());
    assert_eq!(closes.get(), 5);
}
