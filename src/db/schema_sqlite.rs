// SQLite schema definitions; timestamps are stored as RFC 3339 text.

diesel::table! {
    routes (id) {
        id -> Integer,
        owner_id -> BigInt,
        source -> Text,
        destinations -> Text,
        active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    credential_sets (owner_id) {
        owner_id -> BigInt,
        api_id -> Integer,
        api_hash -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    session_artifacts (id) {
        id -> Integer,
        owner_id -> BigInt,
        filename -> Text,
        data -> Binary,
        uploaded_at -> Text,
    }
}

diesel::table! {
    forward_logs (id) {
        id -> Integer,
        owner_id -> BigInt,
        source -> Text,
        original_text -> Text,
        cleaned_text -> Text,
        destination -> Nullable<Text>,
        status -> Text,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    routes,
    credential_sets,
    session_artifacts,
    forward_logs,
);
