//! Packed storage for spherical-harmonic coefficient sets.
//!
//! Coefficients are stored column-major by order: for each selected `m`, the
//! values `a(m, m), a(m+1, m), ..., a(lmax, m)` occupy consecutive slots. The
//! layout is described by an offset per column such that `a(l, m)` lives at
//! `offset(m) + l`; offsets may be negative because `l >= m` for every stored
//! coefficient of column `m`.

use std::ops::{AddAssign, Index, IndexMut, MulAssign};

use num_traits::Zero;

use crate::{AlmError, Result};

// ============================================================================
// AlmLayout
// ============================================================================

/// Storage layout for coefficients `a(l, m)` with `0 <= m <= l <= lmax`.
///
/// A layout is defined by the band limit `lmax`, the strictly ascending set
/// of stored orders `mval`, and one offset per stored order placing column
/// `m` at flat slots `offset(m) + l` for `l in m..=lmax`.
#[derive(Clone, Debug)]
pub struct AlmLayout {
    lmax: usize,
    arrsize: usize,
    mval: Vec<usize>,
    // Offset lookup indexed by m in [0, mmax]. Absent columns hold a large
    // negative sentinel so that a stray index computation lands far out of
    // bounds instead of aliasing a stored column.
    mstart: Vec<isize>,
}

impl AlmLayout {
    /// Number of coefficients in the dense layout with the given band limit
    /// and maximum order. Requires `mmax <= lmax`.
    pub fn num_alms(lmax: usize, mmax: usize) -> usize {
        debug_assert!(mmax <= lmax);
        ((mmax + 1) * (mmax + 2)) / 2 + (mmax + 1) * (lmax - mmax)
    }

    /// Dense layout: every order `m in [0, mmax]`, columns packed in order.
    pub fn new(lmax: usize, mmax: usize) -> Result<Self> {
        if mmax > lmax {
            return Err(AlmError::MmaxTooLarge { mmax, lmax });
        }
        let mut mval = Vec::with_capacity(mmax + 1);
        let mut mstart = Vec::with_capacity(mmax + 1);
        let mut idx = 0isize;
        for m in 0..=mmax {
            mval.push(m);
            mstart.push(idx - m as isize);
            idx += (lmax - m + 1) as isize;
        }
        Ok(Self {
            lmax,
            arrsize: Self::num_alms(lmax, mmax),
            mval,
            mstart,
        })
    }

    /// Sparse layout with caller-chosen column offsets.
    ///
    /// `mval` must be non-empty, strictly ascending and bounded by `lmax`;
    /// `mstart[i]` is the offset of column `mval[i]`, so that `a(l, mval[i])`
    /// lives at slot `mstart[i] + l`.
    pub fn with_arbitrary_layout(lmax: usize, mval: &[usize], mstart: &[isize]) -> Result<Self> {
        Self::validate_mval(lmax, mval)?;
        if mstart.len() != mval.len() {
            return Err(AlmError::LayoutMismatch {
                nmval: mval.len(),
                nmstart: mstart.len(),
            });
        }
        let mmax = mval[mval.len() - 1];
        let mut lookup = vec![Self::sentinel(lmax); mmax + 1];
        let mut arrsize = 0usize;
        for (&m, &start) in mval.iter().zip(mstart) {
            if start + (m as isize) < 0 {
                return Err(AlmError::ColumnUnderflow { m });
            }
            lookup[m] = start;
            arrsize = arrsize.max((start + lmax as isize + 1) as usize);
        }
        Ok(Self {
            lmax,
            arrsize,
            mval: mval.to_vec(),
            mstart: lookup,
        })
    }

    /// Sparse layout with the stored columns packed consecutively in `mval`
    /// order.
    pub fn packed(lmax: usize, mval: &[usize]) -> Result<Self> {
        Self::validate_mval(lmax, mval)?;
        let mmax = mval[mval.len() - 1];
        let mut lookup = vec![Self::sentinel(lmax); mmax + 1];
        let mut cnt = 0isize;
        for &m in mval {
            lookup[m] = cnt - m as isize;
            cnt += (lmax - m + 1) as isize;
        }
        let arrsize = (lookup[mmax] + lmax as isize + 1) as usize;
        Ok(Self {
            lmax,
            arrsize,
            mval: mval.to_vec(),
            mstart: lookup,
        })
    }

    #[inline]
    fn sentinel(lmax: usize) -> isize {
        -2 * (lmax as isize) - 1
    }

    fn validate_mval(lmax: usize, mval: &[usize]) -> Result<()> {
        if mval.is_empty() {
            return Err(AlmError::NoMValues);
        }
        for (i, &m) in mval.iter().enumerate() {
            if m > lmax {
                return Err(AlmError::MOutOfRange { m, lmax });
            }
            if i > 0 && m <= mval[i - 1] {
                return Err(AlmError::MNotAscending);
            }
        }
        Ok(())
    }

    /// The band limit.
    #[inline]
    pub fn lmax(&self) -> usize {
        self.lmax
    }

    /// The largest stored order.
    #[inline]
    pub fn mmax(&self) -> usize {
        self.mval[self.mval.len() - 1]
    }

    /// Number of slots a backing buffer must provide.
    #[inline]
    pub fn n_entries(&self) -> usize {
        self.arrsize
    }

    /// The stored orders, strictly ascending.
    #[inline]
    pub fn mval(&self) -> &[usize] {
        &self.mval
    }

    /// Whether column `m` is stored.
    #[inline]
    pub fn contains_m(&self, m: usize) -> bool {
        self.mval.binary_search(&m).is_ok()
    }

    /// Offset of column `m`; `a(l, m)` lives at `index_l0(m) + l`.
    ///
    /// `m` must be a stored order. For absent columns the sentinel offset is
    /// returned, which no admissible `l` maps into the buffer.
    #[inline]
    pub fn index_l0(&self, m: usize) -> isize {
        self.mstart[m]
    }

    /// Flat slot of `a(l, m)`. Requires a stored `m` and `m <= l <= lmax`.
    #[inline]
    pub fn index(&self, l: usize, m: usize) -> usize {
        debug_assert!(l >= m && l <= self.lmax);
        (self.mstart[m] + l as isize) as usize
    }

    /// Two layouts are conformable when they agree on `lmax`, the stored
    /// orders and every column offset.
    pub fn conformable(&self, other: &Self) -> bool {
        self.lmax == other.lmax && self.mval == other.mval && self.mstart == other.mstart
    }

    /// Whether every order `m in [0, lmax]` is stored.
    #[inline]
    pub fn complete(&self) -> bool {
        self.mval.len() == self.lmax + 1
    }
}

// ============================================================================
// Alm
// ============================================================================

enum Storage<'a, T> {
    Owned(Vec<T>),
    Borrowed(&'a mut [T]),
}

impl<T> Storage<'_, T> {
    #[inline]
    fn as_slice(&self) -> &[T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }
}

/// A spherical-harmonic coefficient set: an [`AlmLayout`] plus storage.
///
/// The buffer is either owned (see [`Alm::zeros`]) or borrowed from the
/// caller (see [`Alm::from_slice`]); the borrowed form mutates the caller's
/// buffer in place and the buffer outlives the store by construction.
pub struct Alm<'a, T> {
    layout: AlmLayout,
    data: Storage<'a, T>,
}

impl<T: Zero + Clone> Alm<'static, T> {
    /// Owned dense store with all coefficients zero.
    pub fn zeros(lmax: usize, mmax: usize) -> Result<Self> {
        Ok(Self::zeros_with(AlmLayout::new(lmax, mmax)?))
    }

    /// Owned store over an arbitrary layout, all coefficients zero.
    pub fn zeros_with(layout: AlmLayout) -> Self {
        let data = vec![T::zero(); layout.n_entries()];
        Self {
            layout,
            data: Storage::Owned(data),
        }
    }
}

impl<'a, T> Alm<'a, T> {
    /// Dense store over a caller-provided buffer, which must hold exactly
    /// [`AlmLayout::num_alms`]`(lmax, mmax)` entries.
    pub fn from_slice(data: &'a mut [T], lmax: usize, mmax: usize) -> Result<Self> {
        let layout = AlmLayout::new(lmax, mmax)?;
        if data.len() != layout.n_entries() {
            return Err(AlmError::BufferSizeMismatch {
                expect: layout.n_entries(),
                got: data.len(),
            });
        }
        Ok(Self {
            layout,
            data: Storage::Borrowed(data),
        })
    }

    /// Store over a caller-provided buffer with an explicit layout. The
    /// buffer must provide at least [`AlmLayout::n_entries`] slots.
    pub fn with_layout(layout: AlmLayout, data: &'a mut [T]) -> Result<Self> {
        if data.len() < layout.n_entries() {
            return Err(AlmError::BufferTooSmall {
                need: layout.n_entries(),
                got: data.len(),
            });
        }
        Ok(Self {
            layout,
            data: Storage::Borrowed(data),
        })
    }

    #[inline]
    pub fn layout(&self) -> &AlmLayout {
        &self.layout
    }

    #[inline]
    pub fn lmax(&self) -> usize {
        self.layout.lmax()
    }

    #[inline]
    pub fn mmax(&self) -> usize {
        self.layout.mmax()
    }

    /// Whether every order `m in [0, lmax]` is stored.
    #[inline]
    pub fn complete(&self) -> bool {
        self.layout.complete()
    }

    /// Whether `self` and `other` share a layout (band limit, stored orders
    /// and column offsets).
    pub fn conformable<U>(&self, other: &Alm<'_, U>) -> bool {
        self.layout.conformable(&other.layout)
    }

    /// Coefficient `a(l, m)`. Requires a stored `m` and `m <= l <= lmax`.
    #[inline]
    pub fn at(&self, l: usize, m: usize) -> &T {
        &self.data.as_slice()[self.layout.index(l, m)]
    }

    /// Mutable coefficient `a(l, m)`. Requires a stored `m` and
    /// `m <= l <= lmax`.
    #[inline]
    pub fn at_mut(&mut self, l: usize, m: usize) -> &mut T {
        let idx = self.layout.index(l, m);
        &mut self.data.as_mut_slice()[idx]
    }

    /// Stored column `m` as a slice indexed by `l - m`.
    pub fn column(&self, m: usize) -> &[T] {
        let lo = self.layout.index(m, m);
        let hi = self.layout.index(self.layout.lmax(), m);
        &self.data.as_slice()[lo..=hi]
    }

    /// Mutable stored column `m` as a slice indexed by `l - m`.
    pub fn column_mut(&mut self, m: usize) -> &mut [T] {
        let lo = self.layout.index(m, m);
        let hi = self.layout.index(self.layout.lmax(), m);
        &mut self.data.as_mut_slice()[lo..=hi]
    }

    /// Flat view of the backing buffer.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Mutable flat view of the backing buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Visit every stored coefficient, outer over the stored orders, inner
    /// over `l = m..=lmax`.
    fn for_each_lm(&mut self, mut f: impl FnMut(usize, usize, &mut T)) {
        let lmax = self.layout.lmax;
        let data = self.data.as_mut_slice();
        for &m in &self.layout.mval {
            let base = self.layout.mstart[m];
            for l in m..=lmax {
                f(l, m, &mut data[(base + l as isize) as usize]);
            }
        }
    }

    /// Set every slot of the store to zero.
    pub fn set_zero(&mut self)
    where
        T: Zero + Clone,
    {
        let n = self.layout.arrsize;
        self.data.as_mut_slice()[..n].fill(T::zero());
    }

    /// Multiply every slot by `factor`.
    pub fn scale<F>(&mut self, factor: F)
    where
        T: MulAssign<F>,
        F: Copy,
    {
        let n = self.layout.arrsize;
        for v in &mut self.data.as_mut_slice()[..n] {
            *v *= factor;
        }
    }

    /// `a(l, m) *= factor[l]` for every stored coefficient.
    pub fn scale_by_l<F>(&mut self, factor: &[F]) -> Result<()>
    where
        T: MulAssign<F>,
        F: Copy,
    {
        if factor.len() <= self.layout.lmax() {
            return Err(AlmError::FactorTooShort {
                need: self.layout.lmax() + 1,
                got: factor.len(),
            });
        }
        self.for_each_lm(|l, _m, v| *v *= factor[l]);
        Ok(())
    }

    /// `a(l, m) *= factor[m]` for every stored coefficient.
    pub fn scale_by_m<F>(&mut self, factor: &[F]) -> Result<()>
    where
        T: MulAssign<F>,
        F: Copy,
    {
        if factor.len() <= self.layout.mmax() {
            return Err(AlmError::FactorTooShort {
                need: self.layout.mmax() + 1,
                got: factor.len(),
            });
        }
        self.for_each_lm(|_l, m, v| *v *= factor[m]);
        Ok(())
    }

    /// `a(0, 0) += num`. Fails when the `m = 0` column is absent.
    pub fn add_scalar<F>(&mut self, num: F) -> Result<()>
    where
        T: AddAssign<F>,
    {
        if !self.layout.contains_m(0) {
            return Err(AlmError::MissingMonopole);
        }
        let idx = self.layout.index(0, 0);
        self.data.as_mut_slice()[idx] += num;
        Ok(())
    }

    /// Elementwise `self += other`; the operands must be conformable.
    pub fn add_assign(&mut self, other: &Alm<'_, T>) -> Result<()>
    where
        T: AddAssign<T> + Copy,
    {
        if !self.conformable(other) {
            return Err(AlmError::NotConformable);
        }
        let n = self.layout.arrsize;
        let dst = &mut self.data.as_mut_slice()[..n];
        let src = &other.data.as_slice()[..n];
        for (d, s) in dst.iter_mut().zip(src) {
            *d += *s;
        }
        Ok(())
    }
}

impl<T> Index<(usize, usize)> for Alm<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, (l, m): (usize, usize)) -> &T {
        self.at(l, m)
    }
}

impl<T> IndexMut<(usize, usize)> for Alm<'_, T> {
    #[inline]
    fn index_mut(&mut self, (l, m): (usize, usize)) -> &mut T {
        self.at_mut(l, m)
    }
}
