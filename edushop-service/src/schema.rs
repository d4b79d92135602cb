diesel::table! {
    lessons (id) {
        id -> Uuid,
        subject -> Varchar,
        location -> Varchar,
        price -> Numeric,
        space -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        name -> Varchar,
        phone -> Varchar,
        lesson_ids -> Jsonb,
        spaces -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    lessons,
    orders,
);
