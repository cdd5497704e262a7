//! Ядро операционной системы реального времени.
//!
//! Содержит кооперативный приоритетный планировщик задач с блокировкой планирования,
//! пулы динамической памяти со слиянием свободных блоков
//! и почтовые ящики с широковещательной рассылкой.
//! Ожидающие задачи стоят в очередях объектов ядра,
//! построенных на интрусивных списках [`common::List`].

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

extern crate alloc;

/// Почтовые ящики для сообщений фиксированного размера.
pub mod mailbox;

/// Пулы динамической памяти.
pub mod memory;

/// Кооперативный планировщик задач [`Scheduler`].
pub mod scheduler;

/// Ядро [`Kernel`], которое владеет всеми объектами.
pub mod system;

/// Задачи и их ожидание объектов ядра.
pub mod task;

pub use common::{
    Error,
    Priority,
    Result,
};

pub use mailbox::{
    MailboxId,
    MailboxInfo,
    Message,
};
pub use memory::{
    Address,
    MemoryPoolInfo,
    PoolId,
};
pub use scheduler::Scheduler;
pub use system::Kernel;
pub use task::{
    Outcome,
    State,
    Suspend,
    SuspendReason,
    SuspendType,
    TaskId,
};
