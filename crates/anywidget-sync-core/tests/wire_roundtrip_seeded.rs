use anywidget_sync_core::value::{StateMap, StateValue};
use anywidget_sync_core::wire::{
    buffers_from_base64, buffers_to_base64, decode_state, decode_value, encode_state, encode_value,
};
use std::collections::BTreeMap;

#[test]
fn wire_roundtrip_holds_for_seeded_state_trees() {
    for seed in seeds() {
        let state = random_state(seed, 4);
        let encoded = encode_value(&state);
        assert_eq!(
            encoded.buffer_paths.len(),
            encoded.buffers.len(),
            "positional correspondence seed={seed}"
        );
        let decoded =
            decode_value(&encoded.state, &encoded.buffer_paths, &encoded.buffers)
                .expect("decode must succeed");
        assert_eq!(decoded, state, "roundtrip mismatch seed={seed}");
    }
}

#[test]
fn wire_roundtrip_survives_base64_transport() {
    for seed in seeds() {
        let state = random_state(seed ^ 0xa5a5_a5a5, 3);
        let encoded = encode_value(&state);
        let text = buffers_to_base64(&encoded.buffers);
        let raw = buffers_from_base64(&text).expect("base64 decode must succeed");
        assert_eq!(raw, encoded.buffers, "base64 inverse mismatch seed={seed}");
        let decoded = decode_value(&encoded.state, &encoded.buffer_paths, &raw)
            .expect("decode must succeed");
        assert_eq!(decoded, state, "transport roundtrip mismatch seed={seed}");
    }
}

#[test]
fn state_map_roundtrip_with_buffer_free_tree() {
    let state = StateMap::from([
        ("a".to_string(), StateValue::from(1i64)),
        ("b".to_string(), StateValue::from("text")),
    ]);
    let encoded = encode_state(&state);
    assert!(encoded.buffers.is_empty());
    assert!(encoded.buffer_paths.is_empty());
    let decoded =
        decode_state(&encoded.state, &encoded.buffer_paths, &encoded.buffers).unwrap();
    assert_eq!(decoded, state);
}

#[test]
fn extra_buffers_beyond_listed_paths_are_ignored() {
    let state = StateMap::from([("buf".to_string(), StateValue::Bytes(vec![1, 2]))]);
    let encoded = encode_state(&state);
    let mut buffers = encoded.buffers.clone();
    buffers.push(vec![9, 9, 9]);
    let decoded = decode_state(&encoded.state, &encoded.buffer_paths, &buffers).unwrap();
    assert_eq!(decoded, state);
}

fn seeds() -> [u64; 16] {
    [
        0x5eed_c0de_u64,
        0x0000_0000_0000_0001_u64,
        0x0000_0000_0000_00ff_u64,
        0x0000_0000_00c0_ffee_u64,
        0x0123_4567_89ab_cdef_u64,
        0x1111_2222_3333_4444_u64,
        0x2222_3333_4444_5555_u64,
        0x3333_4444_5555_6666_u64,
        0x4444_5555_6666_7777_u64,
        0x5555_6666_7777_8888_u64,
        0x89ab_cdef_0123_4567_u64,
        0xfedc_ba98_7654_3210_u64,
        0x1357_9bdf_2468_ace0_u64,
        0x0f0f_f0f0_55aa_aa55_u64,
        0xa5a5_5a5a_dead_beef_u64,
        0x0000_0000_0000_4004_u64,
    ]
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Lcg {
        Lcg {
            state: seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407),
        }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 11
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

fn random_state(seed: u64, depth: u32) -> StateValue {
    let mut rng = Lcg::new(seed);
    random_value(&mut rng, depth)
}

fn random_value(rng: &mut Lcg, depth: u32) -> StateValue {
    let choice = if depth == 0 {
        rng.below(5)
    } else {
        rng.below(8)
    };
    match choice {
        0 => StateValue::Null,
        1 => StateValue::Bool(rng.below(2) == 0),
        2 => StateValue::from(rng.below(1_000_000) as i64 - 500_000),
        3 => StateValue::String(format!("s{}", rng.below(1000))),
        4 => {
            let len = rng.below(9) as usize;
            StateValue::Bytes((0..len).map(|_| rng.below(256) as u8).collect())
        }
        5 | 6 => {
            let len = rng.below(4) as usize;
            StateValue::Array((0..len).map(|_| random_value(rng, depth - 1)).collect())
        }
        _ => {
            let len = rng.below(4) as usize;
            let mut map = BTreeMap::new();
            for i in 0..len {
                map.insert(format!("k{i}"), random_value(rng, depth - 1));
            }
            StateValue::Object(map)
        }
    }
}
