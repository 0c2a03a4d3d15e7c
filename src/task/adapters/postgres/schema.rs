//! Diesel schema for companion task persistence.

diesel::table! {
    /// Companion task rows, one per link and task type.
    companion_tasks (id) {
        /// Task identifier.
        id -> Int8,
        /// Owning companion link.
        companion_link_id -> Uuid,
        /// Task type tag.
        #[sql_name = "type"]
        #[max_length = 64]
        task_type -> Varchar,
        /// Untyped metadata payload.
        metadata -> Nullable<Jsonb>,
        /// Optimistic-concurrency version of `metadata`.
        version -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only status history of companion tasks.
    companion_task_statuses (id) {
        /// Status event identifier.
        id -> Int8,
        /// Owning task.
        companion_task_id -> Int8,
        /// Status name.
        #[max_length = 32]
        name -> Varchar,
        /// Append timestamp.
        created_at -> Timestamptz,
    }
}

diesel::joinable!(companion_task_statuses -> companion_tasks (companion_task_id));
diesel::allow_tables_to_appear_in_same_query!(companion_tasks, companion_task_statuses);
