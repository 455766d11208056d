utils::configurable_constants! {
    /// Size of the random block generated for each upload stream; chunks are slices of it.
    ref RANDOM_BUFFER_SIZE: usize = 1024 * 1024;

    /// Size of a single download read.
    ref DOWNLOAD_READ_SIZE: usize = 32 * 1024;

    /// Buffer capacity the multiplexed transport offers the upload provider on each pull.
    ref MULTIPLEXED_UPLOAD_CAPACITY: usize = 64 * 1024;
}

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
