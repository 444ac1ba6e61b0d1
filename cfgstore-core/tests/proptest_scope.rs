//! Property tests for scope id packing

use cfgstore_core::{Scope, ScopeId, MAX_INSTANCE_ID};
use proptest::prelude::*;

fn any_scope() -> impl Strategy<Value = Scope> {
    prop::sample::select(Scope::ALL.to_vec())
}

proptest! {
    #[test]
    fn pack_unpack_roundtrip(scope in any_scope(), id in 0..=MAX_INSTANCE_ID) {
        let packed = ScopeId::pack(scope, id).unwrap();
        prop_assert_eq!(packed.unpack(), (scope, id));
        prop_assert_eq!(ScopeId::from_raw(packed.raw()).unwrap(), packed);
    }

    #[test]
    fn text_form_roundtrip(scope in any_scope(), id in 0..=MAX_INSTANCE_ID) {
        let packed = ScopeId::pack(scope, id).unwrap();
        let parsed: ScopeId = packed.to_string().parse().unwrap();
        prop_assert_eq!(parsed, packed);
    }

    #[test]
    fn out_of_range_ids_are_rejected(scope in any_scope(), id in (MAX_INSTANCE_ID + 1)..=u32::MAX) {
        prop_assert!(ScopeId::pack(scope, id).is_err());
    }

    #[test]
    fn ordering_follows_kind_then_id(
        a in any_scope(), ia in 0..=MAX_INSTANCE_ID,
        b in any_scope(), ib in 0..=MAX_INSTANCE_ID,
    ) {
        let left = ScopeId::pack(a, ia).unwrap();
        let right = ScopeId::pack(b, ib).unwrap();
        prop_assert_eq!(left.cmp(&right), (a, ia).cmp(&(b, ib)));
    }
}
