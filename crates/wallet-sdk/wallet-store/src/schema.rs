diesel::table! {
    change_outputs (output_id) {
        output_id -> BigInt,
        txid -> Binary,
        vout -> Integer,
        satoshis -> BigInt,
        locking_script -> Binary,
        spent -> Integer,
        spending_txid -> Nullable<Binary>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    generation_runs (run_id) {
        run_id -> BigInt,
        status -> Integer,
        spending_txid -> Nullable<Binary>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    change_allocations (output_id) {
        output_id -> BigInt,
        run_id -> BigInt,
        allocated_at -> Text,
    }
}

diesel::joinable!(change_allocations -> change_outputs (output_id));
diesel::joinable!(change_allocations -> generation_runs (run_id));

diesel::allow_tables_to_appear_in_same_query!(change_allocations, change_outputs, generation_runs,);
