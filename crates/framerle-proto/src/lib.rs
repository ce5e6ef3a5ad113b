//! Protobuf messages for exporting persisted frame records.

pub mod proto {
    /// One persisted frame row.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StoredFrame {
        /// Store-assigned surrogate key.
        #[prost(int64, tag = "1")]
        pub id: i64,
        #[prost(string, tag = "2")]
        pub video_name: ::prost::alloc::string::String,
        #[prost(uint32, tag = "3")]
        pub frame_number: u32,
        /// Presentation time in milliseconds, as text.
        #[prost(string, tag = "4")]
        pub timestamp: ::prost::alloc::string::String,
        /// Run-length encoded bitmap (`<count><A|B>` tokens).
        #[prost(string, tag = "5")]
        pub rle: ::prost::alloc::string::String,
    }
}
