use super::*;
use crate::codec::{self, ElemType};

fn int(v: i64) -> Vec<u8> {
    codec::encode_int(v)
}

fn int_stack(perspective: Perspective, values: &[i64]) -> Stack {
    let s = Stack::new(ElemType::Int, perspective);
    for v in values {
        s.push(codec::encode_int(*v)).unwrap();
    }
    s
}

#[test]
fn unattached_views_fail_explicitly() {
    let v = View::new(Perspective::Lifo);
    assert_eq!(v.peek(), Err(StackError::Unattached));
    assert_eq!(v.pop(), Err(StackError::Unattached));
    assert_eq!(v.remaining(), Err(StackError::Unattached));
    assert!(!v.is_attached());
    v.detach(); // idempotent on a detached view
}

#[test]
fn views_decouple_perspective_from_the_host() {
    let s = int_stack(Perspective::Lifo, &[1, 2, 3]);
    let newest = View::new(Perspective::Lifo);
    let oldest = View::new(Perspective::Fifo);
    newest.attach(&s);
    oldest.attach(&s);

    assert_eq!(newest.peek().unwrap(), int(3));
    assert_eq!(oldest.peek().unwrap(), int(1));

    // Pops through each view hit opposite ends of the same storage.
    assert_eq!(newest.pop().unwrap(), int(3));
    assert_eq!(oldest.pop().unwrap(), int(1));
    assert_eq!(s.len(), 1);
    assert_eq!(s.peek().unwrap(), int(2));

    newest.detach();
    oldest.detach();
    assert_eq!(s.len(), 1);
}

#[test]
fn cursor_traversal_and_bounds() {
    let s = int_stack(Perspective::Fifo, &[10, 20, 30]);
    let v = View::new(Perspective::Fifo);
    v.attach(&s);

    assert_eq!(v.remaining().unwrap(), 3);
    assert_eq!(v.peek().unwrap(), int(10));
    v.advance().unwrap();
    assert_eq!(v.peek().unwrap(), int(20));
    assert_eq!(v.cursor(), 1);
    v.advance().unwrap();
    v.advance().unwrap();
    // Cursor sits at the exhausted position; another step is out of range.
    assert_eq!(v.remaining().unwrap(), 0);
    assert_eq!(v.advance(), Err(StackError::OutOfRange(4)));
    assert_eq!(v.peek(), Err(StackError::OutOfRange(3)));

    v.reset();
    assert_eq!(v.peek().unwrap(), int(10));
    v.set_cursor(2).unwrap();
    assert_eq!(v.peek().unwrap(), int(30));
    assert_eq!(v.set_cursor(9), Err(StackError::OutOfRange(9)));
}

#[test]
fn lifo_cursor_counts_from_the_end() {
    let s = int_stack(Perspective::Fifo, &[1, 2, 3]);
    let v = View::new(Perspective::Lifo);
    v.attach(&s);
    assert_eq!(v.peek().unwrap(), int(3));
    v.advance().unwrap();
    assert_eq!(v.peek().unwrap(), int(2));
    // A cursor-relative offset reaches past the cursor.
    assert_eq!(v.peek_at(1).unwrap(), int(1));
}

#[test]
fn indexed_view_takes_absolute_positions() {
    let s = int_stack(Perspective::Lifo, &[5, 6, 7]);
    let v = View::new(Perspective::Indexed);
    v.attach(&s);
    assert_eq!(v.peek_at(0).unwrap(), int(5));
    assert_eq!(v.peek_at(2).unwrap(), int(7));
    assert_eq!(v.pop_at(1).unwrap(), int(6));
    assert_eq!(s.len(), 2);
}

#[test]
fn hash_views_have_no_cursor() {
    let s = Stack::new(ElemType::Int, Perspective::Hash);
    s.push_keyed(int(1), b"a".to_vec()).unwrap();
    let v = View::new(Perspective::Hash);
    v.attach(&s);
    assert_eq!(v.advance(), Err(StackError::NoCursor));
    assert_eq!(v.set_cursor(0), Err(StackError::NoCursor));
    assert_eq!(v.peek(), Err(StackError::KeyRequired));
    assert_eq!(v.remaining().unwrap(), 1);
}

#[test]
fn hash_view_pop_deletes_the_host_entry() {
    let s = Stack::new(ElemType::Int, Perspective::Hash);
    s.push_keyed(int(1), b"a".to_vec()).unwrap();
    s.push_keyed(int(2), b"b".to_vec()).unwrap();
    let v = View::new(Perspective::Hash);
    v.attach(&s);

    assert_eq!(v.peek_key(b"a").unwrap(), int(1));
    assert_eq!(v.pop_key(b"a").unwrap(), int(1));
    assert_eq!(s.len(), 1);
    assert_eq!(
        s.peek_key(b"a"),
        Err(StackError::KeyMissing("a".to_string()))
    );
    assert_eq!(
        v.pop_key(b"a"),
        Err(StackError::KeyMissing("a".to_string()))
    );
}

#[test]
fn hash_view_over_a_positional_host_uses_its_snapshot() {
    let s = int_stack(Perspective::Fifo, &[1, 2]);
    s.set_perspective(Perspective::Hash).unwrap();
    s.set_perspective(Perspective::Indexed).unwrap();
    // The host dropped its index but kept the key buffer; a hash view
    // attached now rebuilds a private lookup from those keys.
    let v = View::new(Perspective::Hash);
    v.attach(&s);
    assert_eq!(v.peek_key(b"1").unwrap(), int(2));
    assert_eq!(v.pop_key(b"0").unwrap(), int(1));
    assert_eq!(s.len(), 1);
}

#[test]
fn walk_respects_view_order_and_cursor() {
    let s = int_stack(Perspective::Fifo, &[1, 2, 3, 4]);
    let v = View::new(Perspective::Lifo);
    v.attach(&s);
    v.set_cursor(1).unwrap(); // skip the newest element

    let dest = Stack::new(ElemType::Int, Perspective::Fifo);
    let n = v
        .walk(|b| Ok(b.to_vec()), &dest, None)
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(dest.snapshot().unwrap(), vec![int(3), int(2), int(1)]);
    // Source untouched.
    assert_eq!(s.len(), 4);
}

#[test]
fn walk_into_hash_destination_inherits_keys() {
    let s = Stack::new(ElemType::Int, Perspective::Hash);
    s.push_keyed(int(1), b"a".to_vec()).unwrap();
    s.push_keyed(int(2), b"b".to_vec()).unwrap();
    let v = View::new(Perspective::Hash);
    v.attach(&s);

    let dest = Stack::new(ElemType::Int, Perspective::Hash);
    let errs = Stack::new(ElemType::Bytes, Perspective::Lifo);
    let n = v
        .walk(
            |b| {
                let x = codec::decode_int(b).map_err(|e| e.to_string())?;
                Ok(codec::encode_int(x + 100))
            },
            &dest,
            Some(&errs),
        )
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(dest.peek_key(b"a").unwrap(), int(101));
    assert_eq!(dest.peek_key(b"b").unwrap(), int(102));
    assert_eq!(errs.len(), 0);
}
