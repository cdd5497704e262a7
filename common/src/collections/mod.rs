/// Интрусивный
/// [циклический двусвязный список](https://en.wikipedia.org/wiki/Doubly_linked_list#Circular_doubly_linked_lists),
/// на котором построены списки свободных блоков памяти и очереди ожидающих задач.
mod list;

/// Таблица объектов ядра с идентификаторами, которые
/// остаются уникальными на протяжении всего времени работы системы.
mod table;

pub use list::{
    Iter,
    Link,
    Linked,
    List,
    Node,
    Priority,
};
pub use table::{
    Id,
    Table,
};
