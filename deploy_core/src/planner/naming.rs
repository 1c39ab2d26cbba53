//! Stable auto-generated service names (spec.md §4.4): `<adjective>-<noun>`,
//! assigned once when `ServiceSpec.name` is empty and then persisted by
//! the caller so subsequent `Plan` calls are idempotent.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
  "amber", "brisk", "calm", "dusty", "eager", "faint", "gentle", "hazy",
  "idle", "jolly", "keen", "lively", "mellow", "nimble", "opal", "plain",
  "quiet", "rustic", "steady", "tidy", "umber", "vivid", "wry", "young",
];

const NOUNS: &[&str] = &[
  "badger", "cedar", "delta", "ember", "falcon", "glacier", "heron",
  "indigo", "juniper", "kestrel", "lagoon", "meadow", "nettle", "otter",
  "pebble", "quail", "ridge", "sparrow", "thistle", "urchin", "valley",
  "willow", "xenon", "yarrow",
];

pub fn generate_name() -> String {
  let mut rng = rand::rng();
  let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
  let noun = NOUNS[rng.random_range(0..NOUNS.len())];
  format!("{adjective}-{noun}")
}
