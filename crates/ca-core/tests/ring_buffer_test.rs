use ca_core::ring_buffer::RingBuffer;

#[test]
fn retains_only_the_newest_items() {
    let mut buf = RingBuffer::new(3);
    for i in 1..=5 {
        buf.push(i);
    }
    assert_eq!(buf.to_vec(), vec![3, 4, 5]);
    assert_eq!(buf.len(), 3);
}

#[test]
fn preserves_insertion_order_below_capacity() {
    let mut buf = RingBuffer::new(10);
    buf.push("first");
    buf.push("second");
    buf.push("third");
    assert_eq!(buf.to_vec(), vec!["first", "second", "third"]);
    assert_eq!(buf.iter().count(), 3);
}

#[test]
fn length_never_exceeds_capacity() {
    let mut buf = RingBuffer::new(4);
    for i in 0..100 {
        buf.push(i);
        assert!(buf.len() <= buf.capacity());
    }
    assert_eq!(buf.to_vec(), vec![96, 97, 98, 99]);
}

#[test]
fn clear_empties_the_buffer() {
    let mut buf = RingBuffer::new(2);
    buf.push(1);
    buf.push(2);
    buf.clear();
    assert!(buf.is_empty());
    assert_eq!(buf.len(), 0);
    assert!(buf.to_vec().is_empty());

    buf.push(7);
    assert_eq!(buf.to_vec(), vec![7]);
}
