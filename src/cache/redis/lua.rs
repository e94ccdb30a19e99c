//! Lua scripts for the redis cache store

// Stores an entry and registers its key in the tag set of every table it read
//
// KEYS[1]: entry key
// KEYS[2..]: tag set keys, one per table
// ARGV[1]: serialised entry value
//
// Returns: number of tag sets the entry was added to
pub static PUT_ENTRY_SCRIPT: &str = r#"
local entry_key = KEYS[1]
redis.call('SET', entry_key, ARGV[1])

for i = 2, #KEYS do
    redis.call('SADD', KEYS[i], entry_key)
end
return #KEYS - 1
"#;

// Drops every entry registered in the given tag sets, then the tag sets themselves
// Members of other tag sets pointing at dropped entries are left behind; deleting a
// missing key later is a no-op
//
// KEYS[1..]: tag set keys, one per mutated table
//
// Returns: number of entries removed
pub static INVALIDATE_TAGS_SCRIPT: &str = r#"
local removed = 0
for i = 1, #KEYS do
    local members = redis.call('SMEMBERS', KEYS[i])
    for _, entry_key in ipairs(members) do
        removed = removed + redis.call('DEL', entry_key)
    end
    redis.call('DEL', KEYS[i])
end
return removed
"#;

// Removes every key of a cache namespace
// Uses SCAN in batches so large namespaces do not block on a single KEYS call
//
// ARGV[1]: key pattern (namespace followed by `:*`)
//
// Returns: number of keys removed
pub static CLEAR_NAMESPACE_SCRIPT: &str = r#"
local cursor = '0'
local removed = 0
repeat
    local result = redis.call('SCAN', cursor, 'MATCH', ARGV[1], 'COUNT', 500)
    cursor = result[1]
    for _, key in ipairs(result[2]) do
        removed = removed + redis.call('DEL', key)
    end
until cursor == '0'
return removed
"#;
