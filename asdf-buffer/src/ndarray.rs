use std::fmt::{Debug, Formatter};

use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use itertools::Itertools;

use crate::{ByteOrder, DataType, NativeElement, PValue, SharedBuffer};

/// A strided N-dimensional view over a [`SharedBuffer`].
///
/// Views are cheap to clone and to slice; they never copy the underlying bytes. Element access
/// goes through the buffer, so writes through one view are visible through every other view of
/// the same buffer.
#[derive(Clone)]
pub struct NDArray {
    buffer: SharedBuffer,
    dtype: DataType,
    byte_order: ByteOrder,
    shape: Vec<usize>,
    /// Byte strides, one per dimension.
    strides: Vec<usize>,
    /// Byte offset of the first element.
    offset: usize,
}

/// Row-major byte strides for the given shape.
pub fn c_strides(shape: &[usize], width: usize) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut acc = width;
    for (stride, dim) in strides.iter_mut().zip(shape).rev() {
        *stride = acc;
        acc *= (*dim).max(1);
    }
    strides
}

impl NDArray {
    /// Build a view, checking that every addressable element lies inside the buffer.
    pub fn try_new(
        buffer: SharedBuffer,
        dtype: DataType,
        byte_order: ByteOrder,
        shape: Vec<usize>,
        offset: usize,
        strides: Option<Vec<usize>>,
    ) -> AsdfResult<Self> {
        let strides = strides.unwrap_or_else(|| c_strides(&shape, dtype.byte_width()));
        if strides.len() != shape.len() {
            asdf_bail!(
                "strides {:?} do not match shape {:?}",
                strides.as_slice(),
                shape.as_slice()
            );
        }

        if !shape.contains(&0) {
            let last = offset
                + shape
                    .iter()
                    .zip(&strides)
                    .map(|(dim, stride)| (dim - 1) * stride)
                    .sum::<usize>()
                + dtype.byte_width();
            if last > buffer.len() {
                asdf_bail!(
                    BlockConsistency: "array view ends at byte {} but its buffer holds {}",
                    last,
                    buffer.len()
                );
            }
        }

        Ok(Self {
            buffer,
            dtype,
            byte_order,
            shape,
            strides,
            offset,
        })
    }

    /// An array owning a fresh buffer holding `values` in little-endian order.
    pub fn from_vec<T: NativeElement>(values: Vec<T>, shape: Vec<usize>) -> AsdfResult<Self> {
        Self::from_vec_with_order(values, shape, ByteOrder::Little)
    }

    /// An array owning a fresh buffer holding `values` in the given byte order.
    pub fn from_vec_with_order<T: NativeElement>(
        values: Vec<T>,
        shape: Vec<usize>,
        byte_order: ByteOrder,
    ) -> AsdfResult<Self> {
        check_element_count(&shape, values.len())?;
        let width = T::DTYPE.byte_width();
        let mut bytes = vec![0u8; values.len() * width];
        for (value, chunk) in values.into_iter().zip(bytes.chunks_exact_mut(width)) {
            value.write(chunk, byte_order);
        }
        Self::try_new(
            SharedBuffer::new(bytes),
            T::DTYPE,
            byte_order,
            shape,
            0,
            None,
        )
    }

    /// An array of the given type built from dynamically typed values.
    pub fn from_values(
        dtype: DataType,
        byte_order: ByteOrder,
        shape: Vec<usize>,
        values: &[PValue],
    ) -> AsdfResult<Self> {
        check_element_count(&shape, values.len())?;
        let width = dtype.byte_width();
        let mut bytes = vec![0u8; values.len() * width];
        for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(width)) {
            dtype.encode(*value, chunk, byte_order)?;
        }
        Self::try_new(SharedBuffer::new(bytes), dtype, byte_order, shape, 0, None)
    }

    /// A zero-filled array.
    pub fn zeros(dtype: DataType, shape: Vec<usize>) -> AsdfResult<Self> {
        let len = shape.iter().product::<usize>() * dtype.byte_width();
        Self::try_new(
            SharedBuffer::zeroed(len),
            dtype,
            ByteOrder::Little,
            shape,
            0,
            None,
        )
    }

    /// The buffer this view reads from.
    #[inline]
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// The element type.
    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// The element byte order.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// The extent of each dimension.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The byte stride of each dimension.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Byte offset of the first element inside the buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements in the view.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the view addresses no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements the whole base buffer holds.
    pub fn base_len(&self) -> usize {
        self.buffer.len() / self.dtype.byte_width()
    }

    /// Whether the view is row-major with no gaps.
    pub fn is_contiguous(&self) -> bool {
        self.strides == c_strides(&self.shape, self.dtype.byte_width())
    }

    /// Whether the view covers its whole buffer, contiguously and from the start.
    pub fn covers_buffer(&self) -> bool {
        self.offset == 0
            && self.is_contiguous()
            && self.len() * self.dtype.byte_width() == self.buffer.len()
    }

    /// A contiguous view of the same elements with a new shape.
    pub fn reshape(&self, shape: Vec<usize>) -> AsdfResult<Self> {
        if !self.is_contiguous() {
            asdf_bail!("cannot reshape a non-contiguous view");
        }
        check_element_count(&shape, self.len())?;
        Self::try_new(
            self.buffer.clone(),
            self.dtype,
            self.byte_order,
            shape,
            self.offset,
            None,
        )
    }

    /// A view of `start..stop` stepping by `step` along `axis`.
    pub fn slice(&self, axis: usize, start: usize, stop: usize, step: usize) -> AsdfResult<Self> {
        if axis >= self.ndim() {
            asdf_bail!(OutOfBounds: axis, 0, self.ndim());
        }
        if step == 0 {
            asdf_bail!("slice step must be positive");
        }
        let dim = self.shape[axis];
        let stop = stop.min(dim);
        if start > stop {
            asdf_bail!(OutOfBounds: start, 0, stop);
        }

        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape[axis] = (stop - start).div_ceil(step);
        strides[axis] = self.strides[axis] * step;
        let offset = if shape[axis] == 0 {
            self.offset
        } else {
            self.offset + start * self.strides[axis]
        };

        Ok(Self {
            buffer: self.buffer.clone(),
            dtype: self.dtype,
            byte_order: self.byte_order,
            shape,
            strides,
            offset,
        })
    }

    fn byte_position(&self, index: &[usize]) -> AsdfResult<usize> {
        if index.len() != self.ndim() {
            asdf_bail!(
                "index {:?} has {} dimensions, array has {}",
                index,
                index.len(),
                self.ndim()
            );
        }
        let mut position = self.offset;
        for ((&i, &dim), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= dim {
                asdf_bail!(OutOfBounds: i, 0, dim);
            }
            position += i * stride;
        }
        Ok(position)
    }

    /// Byte positions of every element, in row-major order.
    fn byte_positions(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            return vec![self.offset];
        }
        self.shape
            .iter()
            .map(|&dim| 0..dim)
            .multi_cartesian_product()
            .map(|index| {
                index
                    .iter()
                    .zip(&self.strides)
                    .fold(self.offset, |acc, (i, stride)| acc + i * stride)
            })
            .collect()
    }

    /// Read one element.
    pub fn get(&self, index: &[usize]) -> AsdfResult<PValue> {
        let position = self.byte_position(index)?;
        let width = self.dtype.byte_width();
        self.buffer.read(|bytes| {
            self.dtype
                .decode(&bytes[position..position + width], self.byte_order)
        })
    }

    /// Write one element, casting to the array's type.
    pub fn set(&self, index: &[usize], value: impl Into<PValue>) -> AsdfResult<()> {
        let position = self.byte_position(index)?;
        let width = self.dtype.byte_width();
        let value = value.into();
        self.buffer.write(|bytes| {
            self.dtype.encode(
                value,
                &mut bytes[position..position + width],
                self.byte_order,
            )
        })?
    }

    /// Every element in row-major order.
    pub fn values(&self) -> AsdfResult<Vec<PValue>> {
        let positions = self.byte_positions();
        let width = self.dtype.byte_width();
        self.buffer.read(|bytes| {
            positions
                .into_iter()
                .map(|p| self.dtype.decode(&bytes[p..p + width], self.byte_order))
                .collect()
        })
    }

    /// Every element in row-major order as a native Rust type matching the array's type.
    pub fn to_vec<T: NativeElement>(&self) -> AsdfResult<Vec<T>> {
        if T::DTYPE != self.dtype {
            asdf_bail!(
                Conversion: "cannot read {} array as {}",
                self.dtype,
                T::DTYPE
            );
        }
        let positions = self.byte_positions();
        let width = self.dtype.byte_width();
        self.buffer.read(|bytes| {
            positions
                .into_iter()
                .map(|p| T::read(&bytes[p..p + width], self.byte_order))
                .collect()
        })
    }

    /// The elements of the view packed row-major in the view's byte order.
    pub fn to_contiguous_bytes(&self) -> AsdfResult<Vec<u8>> {
        let positions = self.byte_positions();
        let width = self.dtype.byte_width();
        self.buffer.read(|bytes| {
            let mut out = Vec::with_capacity(positions.len() * width);
            for p in positions {
                out.extend_from_slice(&bytes[p..p + width]);
            }
            out
        })
    }

    /// Element-wise equality of type, shape and values. Loads both buffers.
    pub fn array_eq(&self, other: &Self) -> AsdfResult<bool> {
        if self.dtype != other.dtype || self.shape != other.shape {
            return Ok(false);
        }
        Ok(self.values()? == other.values()?)
    }
}

fn check_element_count(shape: &[usize], len: usize) -> AsdfResult<()> {
    let expected = shape.iter().product::<usize>();
    if expected != len {
        return Err(asdf_err!(
            "shape {:?} holds {} elements, got {}",
            shape,
            expected,
            len
        ));
    }
    Ok(())
}

impl PartialEq for NDArray {
    fn eq(&self, other: &Self) -> bool {
        self.array_eq(other).unwrap_or(false)
    }
}

impl Debug for NDArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NDArray")
            .field("dtype", &self.dtype)
            .field("byte_order", &self.byte_order)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    #[test]
    fn views_alias_their_buffer() {
        let base = NDArray::from_vec((0i32..10).collect(), vec![10]).unwrap();
        let view = base.slice(0, 2, 8, 1).unwrap();
        assert_eq!(view.buffer().id(), base.buffer().id());

        view.set(&[0], 42i64).unwrap();
        assert_eq!(base.get(&[2]).unwrap(), PValue::I64(42));
    }

    #[test]
    fn strided_slice() {
        let base = NDArray::from_vec((0u16..12).collect(), vec![3, 4]).unwrap();
        let every_other = base.slice(1, 0, 4, 2).unwrap();
        assert_eq!(every_other.shape(), &[3, 2]);
        assert!(!every_other.is_contiguous());
        assert_eq!(every_other.to_vec::<u16>().unwrap(), vec![0, 2, 4, 6, 8, 10]);

        let rows = base.slice(0, 1, 10, 1).unwrap();
        assert_eq!(rows.shape(), &[2, 4]);
        assert_eq!(rows.offset(), 8);
    }

    #[rstest]
    #[case(vec![6], vec![2, 3])]
    #[case(vec![2, 3], vec![3, 2])]
    #[case(vec![2, 3], vec![6])]
    fn reshape_keeps_values(#[case] from: Vec<usize>, #[case] to: Vec<usize>) {
        let array = NDArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], from).unwrap();
        let reshaped = array.reshape(to.clone()).unwrap();
        assert_eq!(reshaped.shape(), to.as_slice());
        assert_eq!(reshaped.values().unwrap(), array.values().unwrap());
    }

    #[test]
    fn reshape_requires_contiguous() {
        let array = NDArray::from_vec((0i64..8).collect(), vec![8]).unwrap();
        assert!(array.slice(0, 0, 8, 2).unwrap().reshape(vec![2, 2]).is_err());
    }

    #[test]
    fn out_of_bounds_views_are_rejected() {
        let buffer = SharedBuffer::zeroed(16);
        let err = NDArray::try_new(
            buffer,
            DataType::Float64,
            ByteOrder::Little,
            vec![3],
            0,
            None,
        )
        .unwrap_err();
        assert!(err.is_block_consistency());
    }

    #[test]
    fn metadata_does_not_load() {
        let buffer = SharedBuffer::lazy(32, Arc::new(|| Ok(vec![1; 32])));
        let array = NDArray::try_new(
            buffer.clone(),
            DataType::UInt8,
            ByteOrder::Big,
            vec![4, 8],
            0,
            None,
        )
        .unwrap();
        assert_eq!(array.len(), 32);
        assert!(format!("{array:?}").contains("loaded: false"));
        assert!(!buffer.is_loaded());

        assert_eq!(array.get(&[3, 7]).unwrap(), PValue::U64(1));
        assert!(buffer.is_loaded());
    }

    #[test]
    fn big_endian_values() {
        let array =
            NDArray::from_vec_with_order(vec![1i32, -2, 3], vec![3], ByteOrder::Big).unwrap();
        assert_eq!(
            array.to_contiguous_bytes().unwrap(),
            vec![0, 0, 0, 1, 255, 255, 255, 254, 0, 0, 0, 3]
        );
        assert_eq!(array.to_vec::<i32>().unwrap(), vec![1, -2, 3]);
    }

    #[test]
    fn zero_dimensional() {
        let array = NDArray::from_vec(vec![7u8], vec![]).unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.values().unwrap(), vec![PValue::U64(7)]);
    }
}
