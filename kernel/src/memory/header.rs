use core::{
    fmt,
    mem,
};

use static_assertions::const_assert;

use common::{
    Link,
    Node,
};

use super::PoolId;

/// Размер машинного слова целевой платформы.
/// Размеры выделяемых блоков и их выравнивание кратны ему.
pub const WORD: usize = mem::size_of::<u32>();

/// Накладные расходы на заголовок каждого блока памяти.
pub const HEADER_SIZE: usize = 4 * WORD;

/// Минимальный размер выделяемого блока.
/// Свободный блок должен вмещать ссылки списка свободных блоков.
pub const MIN_ALLOCATION: usize = 2 * WORD;

const_assert!(HEADER_SIZE % WORD == 0);
const_assert!(MIN_ALLOCATION % WORD == 0);

/// Округляет `size` вверх до кратного [`WORD`].
pub(super) fn adjusted_size(size: usize) -> Option<usize> {
    size.checked_next_multiple_of(WORD)
}

/// Адрес в пространстве памяти, из которого пулы выделяют блоки.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address(usize);

impl Address {
    /// Создаёт адрес.
    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    /// Нулевой адрес.
    pub const fn null() -> Self {
        Self(0)
    }

    /// Возвращает `true` для нулевого адреса.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Численное значение адреса.
    pub fn into_usize(self) -> usize {
        self.0
    }

    /// Возвращает `true`, если адрес кратен `alignment`.
    pub fn is_aligned(
        &self,
        alignment: usize,
    ) -> bool {
        alignment == 0 || self.0 % alignment == 0
    }
}

impl fmt::Debug for Address {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(formatter)
    }
}

impl fmt::Display for Address {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "0x{:X}", self.0)
    }
}

/// Заголовок блока памяти пула.
///
/// Хранится в отдельной от самой памяти таблице по смещению блока от начала пула,
/// поэтому полезная нагрузка блока и его метаданные никогда не пересекаются.
/// Блок занимает отрезок от своего смещения до смещения физически следующего блока,
/// первые [`HEADER_SIZE`] байт отрезка считаются занятыми заголовком.
#[derive(Clone, Copy, Debug)]
pub(super) struct Header {
    /// Пул, которому принадлежит блок.
    pub(super) pool: PoolId,

    /// Блок свободен и стоит в списке свободных блоков.
    pub(super) free: bool,

    /// Смещение физически предыдущего блока.
    pub(super) previous_memory: usize,

    /// Смещение физически следующего блока.
    pub(super) next_memory: usize,

    /// Звено списка свободных блоков, имеет смысл только для свободного блока.
    free_link: Link<usize>,
}

impl Header {
    /// Создаёт заголовок блока со смещением `offset`.
    pub(super) fn new(
        pool: PoolId,
        offset: usize,
        free: bool,
        previous_memory: usize,
        next_memory: usize,
    ) -> Self {
        Self {
            pool,
            free,
            previous_memory,
            next_memory,
            free_link: Link::new(offset, 0),
        }
    }
}

impl Node<usize> for Header {
    fn link(&self) -> &Link<usize> {
        &self.free_link
    }

    fn link_mut(&mut self) -> &mut Link<usize> {
        &mut self.free_link
    }
}
