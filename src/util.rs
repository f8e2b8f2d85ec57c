//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

/// Marks the branch it is called from as unlikely.
#[cold]
#[inline]
pub fn cold_path() {}
