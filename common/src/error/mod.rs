use core::result;

use derive_more::Display;

/// Перечисление для возможных ошибок.
///
/// Ошибки нарушения контракта обнаруживаются до каких-либо изменений состояния,
/// поэтому вернувшая такую ошибку операция ничего не меняет.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Error {
    /// Задан недопустимый указатель,
    /// например освобождается блок памяти, который не был выделен.
    #[display("invalid pointer")]
    InvalidPointer,

    /// Задан недопустимый или удалённый пул памяти.
    #[display("invalid memory pool")]
    InvalidPool,

    /// Задан недопустимый или удалённый почтовый ящик.
    #[display("invalid mailbox")]
    InvalidMailbox,

    /// Задана недопустимая или удалённая задача.
    #[display("invalid task")]
    InvalidTask,

    /// Ожидание запрошено не из контекста задачи.
    #[display("invalid suspend")]
    InvalidSuspend,

    /// Задан недопустимый размер.
    #[display("invalid size")]
    InvalidSize,

    /// Задана недопустимая область памяти.
    #[display("invalid memory")]
    InvalidMemory,

    /// Операция недопустима в текущем состоянии объекта.
    #[display("invalid operation")]
    InvalidOperation,

    /// Адрес не выровнен.
    #[display("not aligned")]
    NotAligned,

    /// В пуле недостаточно свободной памяти.
    #[display("no memory")]
    NoMemory,

    /// Почтовый ящик уже содержит сообщение.
    #[display("mailbox full")]
    MailboxFull,

    /// Почтовый ящик пуст.
    #[display("mailbox empty")]
    MailboxEmpty,

    /// Почтовый ящик удалён, пока задача его ожидала.
    #[display("mailbox deleted")]
    MailboxDeleted,

    /// Почтовый ящик сброшен, пока задача его ожидала.
    #[display("mailbox reset")]
    MailboxReset,

    /// Пул памяти удалён, пока задача его ожидала.
    #[display("memory pool deleted")]
    PoolDeleted,

    /// Задача завершена принудительно, пока ожидала.
    #[display("task terminated")]
    TaskTerminated,

    /// Истёк тайм-аут.
    #[display("timeout")]
    Timeout,
}

/// Тип возвращаемого результата `T` или ошибки [`Error`] ---
/// мономорфизация [`result::Result`] по типу ошибки.
pub type Result<T> = result::Result<T, Error>;
