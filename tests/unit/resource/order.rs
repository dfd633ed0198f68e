use super::*;

#[test]
fn dequeue_follows_append_order() {
    let mut q = EvictionOrder::new();
    q.enqueue("a");
    q.enqueue("b");
    q.enqueue("c");
    assert_eq!(q.count(), 3);
    assert_eq!(q.dequeue(), Some("a"));
    assert_eq!(q.dequeue(), Some("b"));
    assert_eq!(q.dequeue(), Some("c"));
    assert_eq!(q.dequeue(), None);
}

#[test]
fn reenqueue_moves_to_tail_without_duplicates() {
    let mut q = EvictionOrder::new();
    q.enqueue(1);
    q.enqueue(2);
    q.enqueue(3);
    q.enqueue(1);
    assert_eq!(q.count(), 3);
    assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2, 3, 1]);
    assert_eq!(q.peek(), Some(&2));
}

#[test]
fn empty_dequeue_is_not_an_error() {
    let mut q: EvictionOrder<u32> = EvictionOrder::new();
    assert!(q.is_empty());
    assert_eq!(q.dequeue(), None);
    assert_eq!(q.dequeue(), None);
    assert_eq!(q.count(), 0);
}

#[test]
fn remove_withdraws_from_any_position() {
    let mut q = EvictionOrder::new();
    q.enqueue('x');
    q.enqueue('y');
    q.enqueue('z');
    assert!(q.remove(&'y'));
    assert!(!q.remove(&'y'));
    assert!(!q.contains(&'y'));
    assert_eq!(q.dequeue(), Some('x'));
    assert_eq!(q.dequeue(), Some('z'));
}
