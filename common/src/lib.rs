//! Общая для всех объектов ядра библиотека.
//!
//! Содержит интрусивные циклические двусвязные списки, на которых построены
//! все очереди ядра, таблицу объектов с проверяемыми идентификаторами,
//! перечисление ошибок и поддержку журналирования.

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

extern crate alloc;

/// Коллекции элементов.
pub mod collections;

/// Перечисление для возможных ошибок [`Error`] и соответствующий [`Result`].
pub mod error;

/// Поддержка журналирования макросами библиотеки [`tracing`].
pub mod log;

pub use collections::{
    Id,
    Link,
    Linked,
    List,
    Node,
    Priority,
    Table,
};
pub use error::{
    Error,
    Result,
};
