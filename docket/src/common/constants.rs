// document constants
pub const DOC_ID: &str = "id";
pub const DOC_ETAG: &str = "_etag";
pub const DOC_TIMESTAMP: &str = "_ts";
pub const DOC_SELF: &str = "_self";
pub const SYSTEM_FIELDS: [&str; 3] = [DOC_ETAG, DOC_TIMESTAMP, DOC_SELF];

// metadata document
pub const METADATA_ID: &str = "_metadata";
pub const METADATA_LAST_ID: &str = "lastId";

// id constants
pub const INVALID_ID_CHARS: [char; 4] = ['/', '\\', '?', '#'];
pub const MAX_ID_LENGTH: usize = 255;

// config defaults
pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_MAX_COUNT_PER_INVOCATION: usize = 600;
pub const DEFAULT_UNIQUE_ID_RETRY_LIMIT: u32 = 50;
pub const DEFAULT_UNIQUE_ID_SUFFIX_LENGTH: usize = 5;
pub const DEFAULT_BULK_BATCH_BUDGET: usize = 200;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 9;

// built-in trigger names
pub const TRG_ENSURE_UNIQUE_ID: &str = "trgEnsureUniqueId";
pub const TRG_UPDATE_METADATA: &str = "trgUpdateMetadata";

// built-in procedure names
pub const SP_HELLO_WORLD: &str = "spHelloWorld";
pub const SP_SET_NORTH_AMERICA: &str = "spSetNorthAmerica";
pub const SP_ENSURE_UNIQUE_ID: &str = "spEnsureUniqueId";
pub const SP_BULK_INSERT: &str = "spBulkInsert";
pub const SP_BULK_DELETE: &str = "spBulkDelete";
pub const SP_SELECT_COUNT: &str = "spSelectCount";

pub const DOCKET_VERSION: &str = env!("CARGO_PKG_VERSION");
