use alloc::{
    collections::BTreeMap,
    vec::Vec,
};
use core::{
    fmt,
    iter::FusedIterator,
};

use super::table::{
    Id,
    Table,
};

/// Приоритет узла списка.
/// Меньшее значение соответствует более срочному узлу.
pub type Priority = u8;

/// Звено интрусивного циклического двусвязного списка.
///
/// Встраивается в более крупные структуры --- заголовки блоков памяти, задачи.
/// Сам список никакой памятью не владеет, он владеет только связями между узлами.
///
/// Узел, не входящий ни в один список, замкнут сам на себя.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Link<K> {
    /// Предыдущий узел списка.
    previous: K,

    /// Следующий узел списка.
    next: K,

    /// Приоритет узла, используется только при вставке по приоритету.
    priority: Priority,
}

impl<K: Copy> Link<K> {
    /// Создаёт звено узла `node` с приоритетом `priority`, не входящего ни в один список.
    pub const fn new(
        node: K,
        priority: Priority,
    ) -> Self {
        Self {
            previous: node,
            next: node,
            priority,
        }
    }

    /// Предыдущий узел списка.
    pub fn previous(&self) -> K {
        self.previous
    }

    /// Следующий узел списка.
    pub fn next(&self) -> K {
        self.next
    }

    /// Приоритет узла.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Замыкает звено узла `node` само на себя.
    fn detach(
        &mut self,
        node: K,
    ) {
        self.previous = node;
        self.next = node;
    }
}

/// Структура, во встроенном звене [`Link`] которой хранятся связи узла списка.
pub trait Node<K> {
    /// Звено списка.
    fn link(&self) -> &Link<K>;

    /// Звено списка, доступное на запись.
    fn link_mut(&mut self) -> &mut Link<K>;
}

/// Хранилище узлов, адресуемых ключами типа `K`.
///
/// Обращение к ключу, которого в хранилище нет, --- нарушение контракта вызывающего кода,
/// реализации паникуют.
pub trait Linked<K> {
    /// Звено списка узла `node`.
    fn link(
        &self,
        node: K,
    ) -> &Link<K>;

    /// Звено списка узла `node`, доступное на запись.
    fn link_mut(
        &mut self,
        node: K,
    ) -> &mut Link<K>;
}

impl<T: Node<usize>> Linked<usize> for Vec<T> {
    fn link(
        &self,
        node: usize,
    ) -> &Link<usize> {
        self[node].link()
    }

    fn link_mut(
        &mut self,
        node: usize,
    ) -> &mut Link<usize> {
        self[node].link_mut()
    }
}

impl<K: Copy + fmt::Debug + Ord, T: Node<K>> Linked<K> for BTreeMap<K, T> {
    fn link(
        &self,
        node: K,
    ) -> &Link<K> {
        self.get(&node)
            .unwrap_or_else(|| panic!("list node {node:?} is not in the storage"))
            .link()
    }

    fn link_mut(
        &mut self,
        node: K,
    ) -> &mut Link<K> {
        self.get_mut(&node)
            .unwrap_or_else(|| panic!("list node {node:?} is not in the storage"))
            .link_mut()
    }
}

impl<T: Node<Id<T>>> Linked<Id<T>> for Table<T> {
    fn link(
        &self,
        node: Id<T>,
    ) -> &Link<Id<T>> {
        self.get(node)
            .unwrap_or_else(|| panic!("list node {node} is not in the table"))
            .link()
    }

    fn link_mut(
        &mut self,
        node: Id<T>,
    ) -> &mut Link<Id<T>> {
        self.get_mut(node)
            .unwrap_or_else(|| panic!("list node {node} is not in the table"))
            .link_mut()
    }
}

/// Интрусивный циклический двусвязный список.
///
/// Задаётся только своей головой [`List::head()`], пустой список не имеет головы.
/// Для любого непустого списка движение по ссылкам [`Link::next()`] от любого узла
/// возвращает в этот же узел, а ссылки [`Link::previous()`] и [`Link::next()`]
/// всегда согласованы: `next(node).previous == node`.
///
/// Сам список не выполняет никакой синхронизации,
/// вызывающий код должен удерживать соответствующую блокировку.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct List<K> {
    /// Голова списка.
    head: Option<K>,
}

impl<K: Copy + Eq> List<K> {
    /// Возвращает пустой список.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Голова списка или [`None`], если список пуст.
    pub fn head(&self) -> Option<K> {
        self.head
    }

    /// Возвращает `true`, если список пуст.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Делает головой списка узел `node`, который уже в нём находится.
    /// Так как список циклический, порядок узлов не меняется,
    /// меняется только точка, с которой начинается обход.
    pub fn set_head(
        &mut self,
        node: K,
    ) {
        debug_assert!(self.head.is_some());
        self.head = Some(node);
    }

    /// Вставляет узел `node` в конец списка, то есть непосредственно перед головой.
    /// Если список был пуст, `node` становится его единственным элементом и головой.
    pub fn push_back<L: Linked<K> + ?Sized>(
        &mut self,
        nodes: &mut L,
        node: K,
    ) {
        match self.head {
            None => {
                nodes.link_mut(node).detach(node);
                self.head = Some(node);
            },
            Some(head) => {
                let tail = nodes.link(head).previous;
                Self::link_between(nodes, tail, node, head);
            },
        }
    }

    /// Вставляет узел `node` сразу после узла `anchor`, который уже находится в списке.
    pub fn insert_after<L: Linked<K> + ?Sized>(
        &mut self,
        nodes: &mut L,
        anchor: K,
        node: K,
    ) {
        debug_assert!(self.head.is_some());
        let next = nodes.link(anchor).next;
        Self::link_between(nodes, anchor, node, next);
    }

    /// Вставляет узел `node` перед первым узлом, приоритет которого строго больше
    /// приоритета `node`, то есть менее срочен.
    /// Среди узлов с равным приоритетом сохраняется порядок вставки ---
    /// новый узел встаёт после всех уже имеющихся узлов с таким же приоритетом.
    /// Если `node` срочнее головы списка, он становится новой головой.
    pub fn insert_by_priority<L: Linked<K> + ?Sized>(
        &mut self,
        nodes: &mut L,
        node: K,
    ) {
        let Some(head) = self.head else {
            self.push_back(nodes, node);
            return;
        };

        let priority = nodes.link(node).priority;
        let mut search = head;

        loop {
            if nodes.link(search).priority > priority {
                let previous = nodes.link(search).previous;
                Self::link_between(nodes, previous, node, search);
                if search == head {
                    self.head = Some(node);
                }
                return;
            }

            search = nodes.link(search).next;

            if search == head {
                let tail = nodes.link(head).previous;
                Self::link_between(nodes, tail, node, head);
                return;
            }
        }
    }

    /// Исключает узел `node` из списка.
    /// Если `node` был единственным элементом, список становится пустым.
    /// Если `node` был головой, головой становится следующий за ним узел.
    ///
    /// Узел обязан находиться именно в этом списке, это не проверяется.
    pub fn remove<L: Linked<K> + ?Sized>(
        &mut self,
        nodes: &mut L,
        node: K,
    ) {
        let link = *nodes.link(node);

        if link.previous == node {
            debug_assert!(self.head == Some(node));
            self.head = None;
        } else {
            nodes.link_mut(link.previous).next = link.next;
            nodes.link_mut(link.next).previous = link.previous;

            if self.head == Some(node) {
                self.head = Some(link.next);
            }
        }

        nodes.link_mut(node).detach(node);
    }

    /// Исключает из списка и возвращает его голову.
    pub fn pop_front<L: Linked<K> + ?Sized>(
        &mut self,
        nodes: &mut L,
    ) -> Option<K> {
        let head = self.head?;
        self.remove(nodes, head);
        Some(head)
    }

    /// Итератор по узлам списка, начиная с головы.
    pub fn iter<'a, L: Linked<K> + ?Sized>(
        &self,
        nodes: &'a L,
    ) -> Iter<'a, K, L> {
        Iter {
            head: self.head,
            next: self.head,
            nodes,
        }
    }

    /// Количество узлов в списке.
    pub fn len<L: Linked<K> + ?Sized>(
        &self,
        nodes: &L,
    ) -> usize {
        self.iter(nodes).count()
    }

    /// Проверяет, что список замкнут и ссылки всех его узлов согласованы.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate<L: Linked<K> + ?Sized>(
        &self,
        nodes: &L,
    ) where
        K: fmt::Debug,
    {
        let Some(head) = self.head else {
            return;
        };

        let mut node = head;

        loop {
            let link = nodes.link(node);

            assert_eq!(
                nodes.link(link.next).previous,
                node,
                "broken back link from {:?} to {node:?}",
                link.next,
            );
            assert_eq!(
                nodes.link(link.previous).next,
                node,
                "broken forward link from {:?} to {node:?}",
                link.previous,
            );

            node = link.next;
            if node == head {
                break;
            }
        }
    }

    /// Связывает узел `node` с узлами `previous` и `next`,
    /// которые идут в списке друг за другом.
    fn link_between<L: Linked<K> + ?Sized>(
        nodes: &mut L,
        previous: K,
        node: K,
        next: K,
    ) {
        let link = nodes.link_mut(node);
        link.previous = previous;
        link.next = next;

        nodes.link_mut(previous).next = node;
        nodes.link_mut(next).previous = node;
    }
}

impl<K: Copy + Eq> Default for List<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for List<K> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "List {{ head: {:?} }}", self.head)
    }
}

/// Итератор по узлам списка [`List`], начиная с головы.
pub struct Iter<'a, K, L: ?Sized> {
    /// Голова списка, на которой обход заканчивается.
    head: Option<K>,

    /// Очередной узел обхода.
    next: Option<K>,

    /// Хранилище узлов.
    nodes: &'a L,
}

impl<K: Copy + Eq, L: Linked<K> + ?Sized> Iterator for Iter<'_, K, L> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        let next = self.nodes.link(node).next;

        self.next = if Some(next) == self.head {
            None
        } else {
            Some(next)
        };

        Some(node)
    }
}

impl<K: Copy + Eq, L: Linked<K> + ?Sized> FusedIterator for Iter<'_, K, L> {
}
