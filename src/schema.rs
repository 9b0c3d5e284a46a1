diesel::table! {
    workspaces (id) {
        id -> Integer,
        external_team_id -> Text,
        report_channel_id -> Text,
        default_time -> Text,
        timezone -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        workspace_id -> Integer,
        external_user_id -> Text,
        display_name -> Text,
        email -> Nullable<Text>,
        timezone -> Nullable<Text>,
        active -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    reports (id) {
        id -> Integer,
        user_id -> Integer,
        report_date -> Date,
        feeling -> Nullable<Text>,
        yesterday -> Nullable<Text>,
        today -> Nullable<Text>,
        blockers -> Nullable<Text>,
        skipped -> Bool,
        completed_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    pending_states (id) {
        id -> Integer,
        user_id -> Integer,
        pending_report_date -> Date,
        current_question_index -> Integer,
        prompt_channel -> Nullable<Text>,
        prompt_ts -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(users -> workspaces (workspace_id));
diesel::joinable!(reports -> users (user_id));
diesel::joinable!(pending_states -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    pending_states,
    reports,
    users,
    workspaces,
);
