use crate::{EmptyRefAccess, SharedRef};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::cell::RefCell;

assert_impl_all!(SharedRef<i32>: Send, Sync);
assert_impl_all!(SharedRef<String>: Send, Sync);
assert_not_impl_any!(SharedRef<std::rc::Rc<i32>>: Send, Sync);
assert_not_impl_any!(SharedRef<std::cell::Cell<i32>>: Send, Sync);

#[test]
fn empty_owns_nothing() {
    let handle = SharedRef::<i32>::empty();
    assert!(SharedRef::is_null(&handle));
    assert_eq!(SharedRef::share_count(&handle), 0);
    assert_eq!(SharedRef::get_ref(&handle), Err(EmptyRefAccess));
    assert_eq!(SharedRef::get_copy(&handle), Err(EmptyRefAccess));
}

#[test]
fn default_is_empty() {
    let handle = SharedRef::<i32>::default();
    assert!(SharedRef::is_null(&handle));
}

#[test]
fn new_starts_at_one_share() {
    let handle = SharedRef::new(5);
    assert!(!SharedRef::is_null(&handle));
    assert_eq!(SharedRef::share_count(&handle), 1);
    assert_eq!(*handle, 5);
}

#[test]
fn clone_shares_the_pair() {
    let first = SharedRef::new(String::from("abc"));
    let second = first.clone();

    assert!(SharedRef::ptr_eq(&first, &second));
    assert_eq!(SharedRef::share_count(&first), 2);
    assert_eq!(SharedRef::share_count(&second), 2);
}

#[test]
fn clone_of_empty_is_empty() {
    let first = SharedRef::<i32>::empty();
    let second = first.clone();
    assert!(SharedRef::is_null(&second));
    assert!(SharedRef::ptr_eq(&first, &second));
}

#[test]
fn end_to_end_share_and_release() {
    let first = SharedRef::new(42);
    assert_eq!(SharedRef::share_count(&first), 1);

    let second = first.clone();
    assert_eq!(SharedRef::share_count(&second), 2);

    drop(first);
    assert_eq!(SharedRef::share_count(&second), 1);
    assert_eq!(*second, 42);

    drop(second);
}

#[test]
fn drop_runs_payload_drop_once() {
    struct SetOnDrop<'a>(&'a RefCell<usize>);
    impl Drop for SetOnDrop<'_> {
        fn drop(&mut self) {
            *self.0.borrow_mut() += 1;
        }
    }

    let drops = RefCell::new(0);
    let first = SharedRef::new(SetOnDrop(&drops));
    let second = first.clone();

    drop(first);
    assert_eq!(*drops.borrow(), 0);

    drop(second);
    assert_eq!(*drops.borrow(), 1);
}

#[test]
fn release_is_idempotent() {
    let mut handle = SharedRef::new(5);
    SharedRef::release(&mut handle);
    assert!(SharedRef::is_null(&handle));

    SharedRef::release(&mut handle);
    assert!(SharedRef::is_null(&handle));
}

#[test]
fn release_gives_up_only_own_share() {
    let mut first = SharedRef::new(7);
    let second = first.clone();

    SharedRef::release(&mut first);
    assert!(SharedRef::is_null(&first));
    assert_eq!(SharedRef::share_count(&second), 1);
    assert_eq!(*second, 7);
}

#[test]
fn self_assignment_keeps_the_share() {
    let mut handle = SharedRef::new(5);
    #[allow(clippy::redundant_clone)]
    {
        handle = handle.clone();
    }
    assert_eq!(SharedRef::share_count(&handle), 1);
    assert_eq!(*handle, 5);
}

#[test]
fn equality_is_by_value_not_identity() {
    let first = SharedRef::new(7);
    let second = SharedRef::new(7);

    assert!(!SharedRef::ptr_eq(&first, &second));
    assert_eq!(first, second);

    // Safety: no concurrent payload access in this test.
    unsafe { SharedRef::set(&first, 8).unwrap() };
    assert_ne!(first, second);

    // Safety: as above.
    unsafe { SharedRef::set(&first, 7).unwrap() };
    assert_eq!(first, second);
}

#[test]
fn empty_handles_compare_equal() {
    let empty = SharedRef::<i32>::empty();
    assert_eq!(empty, SharedRef::empty());
    assert_ne!(empty, SharedRef::new(0));
}

#[test]
fn float_nan_ne() {
    let x = SharedRef::new(f32::NAN);
    assert_ne!(x, x);
    assert!(x != x);
}

#[test]
fn get_copy_clones_the_payload() {
    let handle = SharedRef::new(vec![1, 2, 3]);
    let copy = SharedRef::get_copy(&handle).unwrap();
    assert_eq!(copy, [1, 2, 3]);

    // The copy is detached from the pair.
    // Safety: no concurrent payload access in this test.
    unsafe { SharedRef::set(&handle, vec![4]).unwrap() };
    assert_eq!(copy, [1, 2, 3]);
}

#[test]
fn get_mut_ref_mutates_in_place() {
    let handle = SharedRef::new(String::new());
    let alias = handle.clone();

    // Safety: no other payload access while the borrow lives.
    unsafe { SharedRef::get_mut_ref(&handle).unwrap().push_str("foo") };
    assert_eq!(*alias, "foo");
    assert_eq!(SharedRef::share_count(&alias), 2);
}

#[test]
fn set_drops_the_old_payload() {
    struct SetOnDrop<'a>(&'a RefCell<usize>);
    impl Drop for SetOnDrop<'_> {
        fn drop(&mut self) {
            *self.0.borrow_mut() += 1;
        }
    }

    let drops = RefCell::new(0);
    let handle = SharedRef::new(SetOnDrop(&drops));

    // Safety: no concurrent payload access in this test.
    unsafe { SharedRef::set(&handle, SetOnDrop(&drops)).unwrap() };
    assert_eq!(*drops.borrow(), 1);

    drop(handle);
    assert_eq!(*drops.borrow(), 2);
}

#[test]
fn set_on_empty_reports_the_error() {
    let handle = SharedRef::<i32>::empty();
    // Safety: the handle is empty; nothing is written.
    let set_result = unsafe { SharedRef::set(&handle, 1) };
    assert_eq!(set_result, Err(EmptyRefAccess));
    // Safety: as above.
    let borrow_result = unsafe { SharedRef::get_mut_ref(&handle) };
    assert!(borrow_result.is_err());
}

#[test]
fn raw_parts_round_trip_without_recount() {
    let first = SharedRef::new(1);
    let second = first.clone();
    assert_eq!(SharedRef::share_count(&first), 2);

    let (payload, count) = SharedRef::into_raw_parts(second).unwrap();
    assert_eq!(SharedRef::share_count(&first), 2);

    // Safety: the parts carry the share detached above.
    let third = unsafe { SharedRef::from_raw_parts(payload, count) };
    assert_eq!(SharedRef::share_count(&first), 2);
    assert!(SharedRef::ptr_eq(&first, &third));
}

#[test]
fn raw_parts_of_empty_is_none() {
    assert!(SharedRef::into_raw_parts(SharedRef::<i32>::empty()).is_none());
}

#[test]
fn display_renders_the_payload() {
    let handle = SharedRef::new(42);
    assert_eq!(handle.to_string(), "42");
    assert_eq!(SharedRef::<i32>::empty().to_string(), "<nil>");
}

#[test]
fn debug_delegates_to_the_payload() {
    let handle = SharedRef::new("x");
    assert_eq!(format!("{handle:?}"), "\"x\"");
    assert_eq!(format!("{:?}", SharedRef::<i32>::empty()), "<nil>");
}

#[test]
#[should_panic = "empty shared reference"]
fn deref_of_empty_panics() {
    let handle = SharedRef::<i32>::empty();
    let _ = *handle;
}

#[test]
fn from_value_wraps_it() {
    let handle: SharedRef<i32> = 3.into();
    assert_eq!(*handle, 3);
    assert_eq!(SharedRef::share_count(&handle), 1);
}

#[test]
fn zero_sized_payload() {
    #[derive(Clone, PartialEq, Debug)]
    struct Unit;

    let first = SharedRef::new(Unit);
    let second = first.clone();
    assert_eq!(SharedRef::share_count(&first), 2);
    assert_eq!(SharedRef::get_copy(&second).unwrap(), Unit);

    drop(first);
    drop(second);
}

#[test]
fn ptr_eq_distinguishes_zero_sized_pairs() {
    #[derive(Clone, PartialEq, Debug)]
    struct Unit;

    let first = SharedRef::new(Unit);
    let second = SharedRef::new(Unit);
    assert_eq!(SharedRef::share_count(&first), 1);
    assert_eq!(SharedRef::share_count(&second), 1);

    // Independent pairs, even though every zero-sized payload lives at the
    // same dangling address.
    assert!(!SharedRef::ptr_eq(&first, &second));
    assert!(SharedRef::ptr_eq(&first, &first.clone()));
}

#[test]
fn from_box_adopts_the_allocation() {
    let handle = SharedRef::from_box(Box::new(String::from("abc")));
    assert_eq!(SharedRef::share_count(&handle), 1);
    assert_eq!(*handle, "abc");

    let alias = handle.clone();
    assert!(SharedRef::ptr_eq(&handle, &alias));
    assert_eq!(SharedRef::share_count(&alias), 2);
}

#[test]
fn from_box_frees_exactly_once() {
    struct SetOnDrop<'a>(&'a RefCell<usize>);
    impl Drop for SetOnDrop<'_> {
        fn drop(&mut self) {
            *self.0.borrow_mut() += 1;
        }
    }

    let drops = RefCell::new(0);
    let first = SharedRef::from_box(Box::new(SetOnDrop(&drops)));
    let second = first.clone();

    drop(first);
    assert_eq!(*drops.borrow(), 0);

    drop(second);
    assert_eq!(*drops.borrow(), 1);
}

#[test]
fn share_count_tracks_live_handles() {
    let mut rng = SmallRng::seed_from_u64(7);
    let mut handles = vec![SharedRef::new(0u64)];

    for _ in 0..1_000 {
        if handles.len() == 1 || rng.gen_bool(0.5) {
            let fresh = handles[rng.gen_range(0..handles.len())].clone();
            handles.push(fresh);
        } else {
            handles.swap_remove(rng.gen_range(0..handles.len()));
        }
        assert_eq!(SharedRef::share_count(&handles[0]), handles.len());
    }
}

#[test]
fn hash_agrees_with_equality() {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    let first = SharedRef::new(7);
    let second = SharedRef::new(7);
    assert_eq!(hash_of(&first), hash_of(&second));
    assert_eq!(
        hash_of(&SharedRef::<i32>::empty()),
        hash_of(&SharedRef::<i32>::empty())
    );
    assert_ne!(hash_of(&first), hash_of(&SharedRef::<i32>::empty()));
}
