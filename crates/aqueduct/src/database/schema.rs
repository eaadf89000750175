/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Diesel schema for the queue entry table.
//!
//! UUIDs are stored as TEXT and timestamps as SQLite TIMESTAMP columns;
//! conversion to domain types happens at the DAL boundary.

diesel::table! {
    queue_entries (id) {
        id -> Text,
        queue_name -> Text,
        event_type -> Text,
        payload -> Text,
        user_token -> Nullable<Text>,
        search_key1 -> Nullable<BigInt>,
        search_key2 -> Nullable<BigInt>,
        state -> Text,
        owner -> Nullable<Text>,
        lease_expires_at -> Nullable<Timestamp>,
        attempt -> Integer,
        last_error -> Nullable<Text>,
        created_at -> Timestamp,
        effective_at -> Timestamp,
        processed_at -> Nullable<Timestamp>,
    }
}
