// POS application schema - tables written through Diesel's typed query builder

diesel::table! {
    categories (id) {
        id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        color -> Nullable<Text>,
        icon -> Nullable<Text>,
        sort_order -> Integer,
        is_active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}
