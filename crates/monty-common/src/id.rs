use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static BUCKET: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Configure the process-wide generator. Usually called once from
/// main; calling it again replaces the bucket.
pub fn init(machine_id: i32, node_id: i32) {
    *BUCKET.lock().unwrap() = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Next identifier, rendered as a decimal string. A `(1, 1)` bucket is
/// created lazily when `init` was never called.
pub fn next_id() -> String {
    let mut bucket = BUCKET.lock().unwrap();
    bucket
        .get_or_insert_with(|| SnowflakeIdBucket::new(1, 1))
        .get_id()
        .to_string()
}
