//! Environment id generation.
//!
//! Ids are short adjective-animal slugs (`sunny-otter`), unique across all
//! environments of one source repository. Uniqueness is enforced by the
//! repository layer, which retries until the slug does not collide with an
//! existing branch.

use rand::seq::IndexedRandom;

const ADJECTIVES: &[&str] = &[
    "able", "agile", "amber", "ancient", "bold", "brave", "bright", "calm", "casual", "cheeky",
    "chilly", "clever", "cosmic", "crimson", "curious", "daring", "deep", "eager", "early",
    "electric", "fancy", "fierce", "fluffy", "fuzzy", "gentle", "giant", "golden", "happy",
    "hidden", "humble", "jolly", "keen", "lively", "lucky", "mellow", "mighty", "misty", "nimble",
    "patient", "plucky", "proud", "quiet", "rapid", "rustic", "silent", "sleepy", "smooth",
    "snowy", "solid", "speedy", "spicy", "stellar", "sunny", "swift", "tidy", "vivid", "wandering",
    "warm", "wild", "witty",
];

const ANIMALS: &[&str] = &[
    "alpaca", "badger", "beaver", "bison", "camel", "cheetah", "cougar", "coyote", "crane",
    "dingo", "dolphin", "donkey", "falcon", "ferret", "finch", "fox", "gecko", "gibbon", "hare",
    "hawk", "hedgehog", "heron", "ibex", "iguana", "jackal", "koala", "lemur", "lizard", "llama",
    "lynx", "mallard", "marmot", "meerkat", "mole", "moose", "narwhal", "newt", "ocelot",
    "octopus", "osprey", "otter", "owl", "panda", "pelican", "penguin", "possum", "puffin",
    "quokka", "rabbit", "raccoon", "raven", "salmon", "seal", "shrew", "sparrow", "squid",
    "stork", "tapir", "toucan", "walrus", "weasel", "wombat", "yak", "zebra",
];

/// Generate a random adjective-animal slug.
#[must_use]
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("otter");
    format!("{adjective}-{animal}")
}

/// True when the string looks like an environment id this tool could have
/// produced: lowercase words joined by dashes, safe to use as a branch name
/// and a directory name.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
