pub mod column;
pub mod debounce;
pub mod edit;
pub mod filter;
pub mod grid;
pub mod layout;
pub mod row;
pub mod selection;
pub mod sort;
pub mod store;
pub mod value;
pub mod view_state;
pub mod viewport;
pub mod window;
